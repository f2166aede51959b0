//! View frustum planes
//!
//! Planes are extracted straight from a view-projection matrix with the
//! Gribb–Hartmann identities. With OpenGL clip conventions a clip-space point
//! is inside when `-w <= x, y, z <= w`, so each plane is row 3 of the matrix
//! plus or minus row 0, 1 or 2. Normals point into the frustum.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::lighting::point_light::PointLight;

/// Index of each plane in [`Frustum::planes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneSide {
    /// x >= -w
    Left = 0,
    /// x <= w
    Right = 1,
    /// y >= -w
    Bottom = 2,
    /// y <= w
    Top = 3,
    /// z >= -w
    Near = 4,
    /// z <= w
    Far = 5,
}

impl PlaneSide {
    /// All sides in storage order
    pub const ALL: [PlaneSide; 6] = [
        PlaneSide::Left,
        PlaneSide::Right,
        PlaneSide::Bottom,
        PlaneSide::Top,
        PlaneSide::Near,
        PlaneSide::Far,
    ];
}

/// A plane `normal · p + distance = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the frustum
    pub normal: Vec3,
    /// Signed offset from the origin along `normal`
    pub distance: f32,
}

impl Plane {
    /// Build a plane from `(a, b, c, d)` coefficients and normalize it
    ///
    /// A zero-length normal (singular matrix) is not guarded and produces
    /// non-finite values.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Signed distance from the plane to `point`; positive on the inner side
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six clip planes of a camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Planes in [`PlaneSide`] order
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of `view_projection`
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let m = view_projection;
        let row = |i: usize| m.row(i).transpose();
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// One plane
    pub fn plane(&self, side: PlaneSide) -> &Plane {
        &self.planes[side as usize]
    }

    /// Conservative sphere test
    ///
    /// Rejects a sphere only when it lies entirely outside a single plane.
    /// Spheres near a frustum corner may pass while being outside.
    pub fn intersects_sphere(&self, center: &Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Sphere test for a point light's bounding sphere
    pub fn is_light_visible(&self, light: &PointLight) -> bool {
        self.intersects_sphere(&light.center(), light.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    fn cube_frustum() -> Frustum {
        // Orthographic box spanning ±100 on every axis, camera at the origin
        let projection = Mat4::new_orthographic(-100.0, 100.0, -100.0, 100.0, -100.0, 100.0);
        Frustum::from_view_projection(&projection)
    }

    fn perspective_frustum(eye: Vec3, target: Vec3) -> Frustum {
        let projection = Mat4::perspective_gl(55f32.to_radians(), 16.0 / 9.0, 0.1, 400.0);
        let view = Mat4::look_at(eye, target, Vec3::new(0.0, 1.0, 0.0));
        Frustum::from_view_projection(&(projection * view))
    }

    #[test]
    fn test_plane_normals_are_unit_length() {
        let cameras = [
            (Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0)),
            (Vec3::new(10.0, 5.0, -3.0), Vec3::new(-4.0, 2.0, 8.0)),
            (Vec3::new(-100.0, 50.0, 20.0), Vec3::new(0.0, 0.0, 0.0)),
        ];
        for (eye, target) in cameras {
            for plane in perspective_frustum(eye, target).planes {
                assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-5);
            }
        }
        for plane in cube_frustum().planes {
            assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_light_at_center_is_visible() {
        let frustum = cube_frustum();
        let light = PointLight::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0), 1.0, 1.0);
        assert!(frustum.is_light_visible(&light));
    }

    #[test]
    fn test_sphere_fully_outside_one_plane_is_rejected() {
        let frustum = cube_frustum();
        // Right plane sits at x = 100; centre 5 units beyond it
        let right = frustum.plane(PlaneSide::Right);
        let center = Vec3::new(105.0, 0.0, 0.0);
        assert_relative_eq!(right.signed_distance(&center), -5.0, epsilon = 1e-4);

        assert!(!frustum.intersects_sphere(&center, 4.0));
        assert!(frustum.intersects_sphere(&center, 6.0));
    }

    #[test]
    fn test_perspective_culls_behind_and_beyond_far() {
        let frustum = perspective_frustum(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));

        assert!(frustum.intersects_sphere(&Vec3::new(0.0, 0.0, -50.0), 1.0));
        assert!(!frustum.intersects_sphere(&Vec3::new(0.0, 0.0, 50.0), 1.0));
        assert!(!frustum.intersects_sphere(&Vec3::new(0.0, 0.0, -420.0), 13.0));
        // Straddling the far plane counts as visible
        assert!(frustum.intersects_sphere(&Vec3::new(0.0, 0.0, -410.0), 13.0));
    }

    #[test]
    fn test_near_plane_faces_forward() {
        let frustum = perspective_frustum(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        let near = frustum.plane(PlaneSide::Near);
        assert_relative_eq!(near.normal, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(near.signed_distance(&Vec3::new(0.0, 0.0, -0.1)), 0.0, epsilon = 1e-4);
    }
}
