//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics. All matrices follow the
//! OpenGL clip-space convention (right-handed view space, depth in [-1, 1]),
//! which is what the frustum plane extraction and cluster kernels expect.

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

/// Extension trait for Mat4 with the camera-facing constructors the renderer uses
pub trait Mat4Ext {
    /// OpenGL-style perspective projection (right-handed, depth mapped to [-1, 1])
    fn perspective_gl(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective_gl(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // Same layout as glm::perspective:
        // [1/(a*t)  0     0             0           ]
        // [0        1/t   0             0           ]
        // [0        0    -(f+n)/(f-n)  -2fn/(f-n)   ]
        // [0        0    -1             0           ]
        Mat4::new_perspective(aspect, fov_y, near, far)
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_maps_near_and_far_to_ndc_bounds() {
        let proj = Mat4::perspective_gl(utils::deg_to_rad(55.0), 16.0 / 9.0, 0.1, 400.0);

        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -400.0, 1.0);

        assert_relative_eq!(near.z / near.w, -1.0, epsilon = 1e-4);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_look_at_moves_eye_to_origin() {
        let eye = Vec3::new(3.0, 2.0, 1.0);
        let view = Mat4::look_at(eye, Vec3::new(3.0, 2.0, -5.0), Vec3::y());
        let at_eye = view.transform_point(&Point3::from(eye));
        assert_relative_eq!(at_eye.coords, Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_angle_conversions_invert() {
        assert_relative_eq!(utils::deg_to_rad(180.0), constants::PI);
        assert_relative_eq!(utils::rad_to_deg(utils::deg_to_rad(89.0)), 89.0, epsilon = 1e-4);
    }
}
