//! # Fly Camera
//!
//! A free-flying perspective camera driven by yaw/pitch angles. The renderer
//! only consumes what it produces: `view`, `projection`, `near` and `far`.
//!
//! ## Conventions
//! - Right-handed, Y-up world space; the camera looks down its local -Z
//! - Projection follows OpenGL clip conventions (NDC depth in [-1, 1]), which
//!   is what the frustum plane extraction in [`crate::render::lighting`]
//!   expects
//! - Matrices are cached: call [`Camera::update_matrices`] once per frame
//!   after moving the camera

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::render::api::Extent2D;

/// Minimum fly speed in world units per second
pub const MIN_FLY_SPEED: f32 = 0.5;
/// Maximum fly speed in world units per second
pub const MAX_FLY_SPEED: f32 = 125.0;
/// Pitch limit in degrees; avoids the look-at singularity at the poles
pub const PITCH_LIMIT: f32 = 89.0;

const WORLD_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Keyboard driven camera motions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveType {
    /// Along the view direction projected onto the ground plane
    Forward,
    /// Opposite of `Forward`
    Backward,
    /// Strafe left
    Left,
    /// Strafe right
    Right,
    /// Straight up along world Y
    Up,
    /// Straight down along world Y
    Down,
    /// Look up
    PitchUp,
    /// Look down
    PitchDown,
    /// Turn left
    YawLeft,
    /// Turn right
    YawRight,
}

/// Perspective fly camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Up vector used to build the view matrix
    pub up: Vec3,

    /// Vertical field of view in degrees
    pub fov_degrees: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,

    /// Degrees of yaw and pitch per unit of mouse motion
    pub look_sensitivity: (f32, f32),

    yaw: f32,
    pitch: f32,
    direction: Vec3,
    fly_speed: f32,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    /// Create a camera at `position` looking down -Z
    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            up: WORLD_UP,
            fov_degrees: 55.0,
            near: 0.1,
            far: 400.0,
            look_sensitivity: (0.09, 0.07),
            yaw: -90.0,
            pitch: 0.0,
            direction: Vec3::new(0.0, 0.0, -1.0),
            fly_speed: 10.0,
            view: Mat4::identity(),
            projection: Mat4::identity(),
        };
        camera.offset_yaw_pitch(0.0, 0.0);
        camera
    }

    /// Normalized view direction
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Yaw in degrees
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in degrees, always within ±[`PITCH_LIMIT`]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Current fly speed
    pub fn fly_speed(&self) -> f32 {
        self.fly_speed
    }

    /// Set the fly speed, clamped to [`MIN_FLY_SPEED`, `MAX_FLY_SPEED`]
    pub fn set_fly_speed(&mut self, speed: f32) {
        self.fly_speed = speed.clamp(MIN_FLY_SPEED, MAX_FLY_SPEED);
    }

    /// Rotate by the given angles in degrees
    ///
    /// Pitch is clamped before the direction is recomputed, so the camera can
    /// never flip over the vertical.
    pub fn offset_yaw_pitch(&mut self, yaw_offset: f32, pitch_offset: f32) {
        self.yaw += yaw_offset;
        self.pitch = (self.pitch + pitch_offset).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let yaw = utils::deg_to_rad(self.yaw);
        let pitch = utils::deg_to_rad(self.pitch);
        self.direction = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
    }

    /// Turn the camera so it looks at `target`
    pub fn look_at(&mut self, target: Vec3) {
        let to_target = target - self.position;
        if to_target.norm_squared() <= f32::EPSILON {
            return;
        }
        let dir = to_target.normalize();
        self.pitch = 0.0;
        self.yaw = 0.0;
        let yaw = utils::rad_to_deg(dir.z.atan2(dir.x));
        let pitch = utils::rad_to_deg(dir.y.asin());
        self.offset_yaw_pitch(yaw, pitch);
    }

    /// Apply one keyboard motion over `delta_time` seconds
    pub fn process_keyboard(&mut self, move_type: MoveType, delta_time: f32) {
        let speed = self.fly_speed * delta_time;

        let mut planar = Vec3::new(self.direction.x, 0.0, self.direction.z);
        if planar.norm_squared() > f32::EPSILON {
            planar = planar.normalize();
        }
        let right = planar.cross(&WORLD_UP);
        let right = if right.norm_squared() > f32::EPSILON { right.normalize() } else { right };

        match move_type {
            MoveType::Forward => self.position += planar * speed,
            MoveType::Backward => self.position -= planar * speed,
            MoveType::Left => self.position -= right * speed,
            MoveType::Right => self.position += right * speed,
            MoveType::Up => self.position.y += speed,
            MoveType::Down => self.position.y -= speed,
            MoveType::PitchUp => self.offset_yaw_pitch(0.0, 50.0 * delta_time),
            MoveType::PitchDown => self.offset_yaw_pitch(0.0, -50.0 * delta_time),
            MoveType::YawLeft => self.offset_yaw_pitch(-60.0 * delta_time, 0.0),
            MoveType::YawRight => self.offset_yaw_pitch(60.0 * delta_time, 0.0),
        }
        log::trace!("Camera moved {:?} to {:?}", move_type, self.position);
    }

    /// Apply a mouse motion delta in pixels
    pub fn process_mouse_delta(&mut self, delta_x: f32, delta_y: f32) {
        let (sens_x, sens_y) = self.look_sensitivity;
        self.offset_yaw_pitch(sens_x * delta_x, sens_y * delta_y);
    }

    /// Recompute and cache the view and projection matrices
    pub fn update_matrices(&mut self, extent: Extent2D) {
        self.view = Mat4::look_at(self.position, self.position + self.direction, self.up);
        self.projection = Mat4::perspective_gl(
            utils::deg_to_rad(self.fov_degrees),
            extent.aspect(),
            self.near,
            self.far,
        );
    }

    /// Cached view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Cached projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        assert_relative_eq!(camera.direction(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        assert_eq!(camera.fov_degrees, 55.0);
        assert_eq!(camera.near, 0.1);
        assert_eq!(camera.far, 400.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.offset_yaw_pitch(0.0, 500.0);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
        camera.offset_yaw_pitch(0.0, -1000.0);
        assert_eq!(camera.pitch(), -PITCH_LIMIT);
        assert_relative_eq!(camera.direction().norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fly_speed_is_clamped() {
        let mut camera = Camera::default();
        camera.set_fly_speed(1000.0);
        assert_eq!(camera.fly_speed(), MAX_FLY_SPEED);
        camera.set_fly_speed(0.0);
        assert_eq!(camera.fly_speed(), MIN_FLY_SPEED);
    }

    #[test]
    fn test_forward_movement_stays_on_ground_plane() {
        let mut camera = Camera::default();
        camera.offset_yaw_pitch(0.0, 45.0);
        camera.set_fly_speed(10.0);
        camera.process_keyboard(MoveType::Forward, 1.0);

        assert_relative_eq!(camera.position.y, 0.0);
        assert_relative_eq!(camera.position.z, -10.0, epsilon = 1e-4);

        camera.process_keyboard(MoveType::Up, 0.5);
        assert_relative_eq!(camera.position.y, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_strafe_right_moves_along_positive_x() {
        let mut camera = Camera::default();
        camera.process_keyboard(MoveType::Right, 1.0);
        assert!(camera.position.x > 9.9);
    }

    #[test]
    fn test_look_at_points_direction_at_target() {
        let mut camera = Camera::new(Vec3::new(0.0, 10.0, 0.0));
        camera.look_at(Vec3::new(10.0, 10.0, 0.0));
        assert_relative_eq!(camera.direction(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_update_matrices_puts_target_in_front() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 5.0));
        camera.update_matrices(Extent2D::new(1280, 720));

        let p = camera.view() * Vec3::new(0.0, 0.0, 0.0).push(1.0);
        assert_relative_eq!(p.z, -5.0, epsilon = 1e-5);

        let clip = camera.view_projection() * Vec3::new(0.0, 0.0, 0.0).push(1.0);
        let ndc_z = clip.z / clip.w;
        assert!(ndc_z > -1.0 && ndc_z < 1.0);
    }
}
