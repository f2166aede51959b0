//! Point light data and the scene's light pool

use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::foundation::math::Vec3;
use crate::render::{RenderError, RenderResult};

/// GPU layout of a point light (std430, 48 bytes)
///
/// `position.w` is padding and always 1.0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PointLight {
    /// World-space position, w unused
    pub position: [f32; 4],
    /// Linear RGB colour, w unused
    pub color: [f32; 4],
    /// Brightness multiplier
    pub intensity: f32,
    /// Radius of influence; the light's bounding sphere
    pub radius: f32,
    _pad: [f32; 2],
}

impl PointLight {
    /// Create a light
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position: [position.x, position.y, position.z, 1.0],
            color: [color.x, color.y, color.z, 1.0],
            intensity,
            radius,
            _pad: [0.0; 2],
        }
    }

    /// World-space centre
    pub fn center(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }

    /// RGB colour
    pub fn rgb(&self) -> Vec3 {
        Vec3::new(self.color[0], self.color[1], self.color[2])
    }

    /// Check the light's invariants: finite values and a positive radius
    pub fn validate(&self) -> RenderResult<()> {
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(RenderError::InvalidLight(format!(
                "radius must be positive and finite, got {}",
                self.radius
            )));
        }
        let finite = self.position[..3]
            .iter()
            .chain(&self.color[..3])
            .chain(std::iter::once(&self.intensity))
            .all(|v| v.is_finite());
        if !finite {
            return Err(RenderError::InvalidLight(format!(
                "non-finite component in light at {:?}",
                self.position
            )));
        }
        Ok(())
    }
}

/// The scene's point lights
///
/// Owns the light pool that the culler reads each frame. Lights are
/// validated on insertion.
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    lights: Vec<PointLight>,
}

impl LightSet {
    /// Horizontal half-extent of the scatter volume
    pub const SCATTER_HALF_WIDTH: f32 = 125.0;
    /// Height of the scatter volume
    pub const SCATTER_HEIGHT: f32 = 55.0;
    /// Intensity of scattered lights
    pub const SCATTER_INTENSITY: f32 = 1.7;
    /// Radius of scattered lights
    pub const SCATTER_RADIUS: f32 = 13.0;

    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Scatter `count` lights over the scene volume
    ///
    /// Positions are uniform in x,z ∈ [-125, 125], y ∈ [0, 55]; colours are
    /// uniform in [0.5, 1.0) per channel. The same seed yields the same set.
    pub fn scatter(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let half = Self::SCATTER_HALF_WIDTH;

        let lights = (0..count)
            .map(|_| {
                let position = Vec3::new(
                    rng.gen_range(-half..=half),
                    rng.gen_range(0.0..=Self::SCATTER_HEIGHT),
                    rng.gen_range(-half..=half),
                );
                let color = Vec3::new(
                    rng.gen_range(0.5..1.0),
                    rng.gen_range(0.5..1.0),
                    rng.gen_range(0.5..1.0),
                );
                PointLight::new(position, color, Self::SCATTER_INTENSITY, Self::SCATTER_RADIUS)
            })
            .collect();

        log::info!("Scattered {count} point lights (seed {seed})");
        Self { lights }
    }

    /// Add a light, returning its index
    pub fn push(&mut self, light: PointLight) -> RenderResult<usize> {
        light.validate()?;
        self.lights.push(light);
        Ok(self.lights.len() - 1)
    }

    /// All lights in insertion order
    pub fn as_slice(&self) -> &[PointLight] {
        &self.lights
    }

    /// Iterate over the lights
    pub fn iter(&self) -> std::slice::Iter<'_, PointLight> {
        self.lights.iter()
    }

    /// Number of lights
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// True when there are no lights
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Remove every light
    pub fn clear(&mut self) {
        self.lights.clear();
    }
}

impl<'a> IntoIterator for &'a LightSet {
    type Item = &'a PointLight;
    type IntoIter = std::slice::Iter<'a, PointLight>;

    fn into_iter(self) -> Self::IntoIter {
        self.lights.iter()
    }
}
