//! SSAO sample kernel and rotation noise
//!
//! The kernel is a hemisphere of sample offsets in tangent space, denser near
//! the origin. The noise texture is a 4×4 tile of random rotations around
//! the tangent-space z axis, repeated over the screen.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::foundation::math::{utils, Vec3};
use crate::render::api::{
    Extent2D, FilterMode, GpuDevice, GpuResource, ReleaseQueue, TextureDesc, TextureFormat, TextureHandle,
    WrapMode,
};
use crate::render::RenderResult;

/// Number of samples generated; the upper bound of the runtime sample count
pub const KERNEL_SIZE: usize = 64;

/// Side length of the noise tile
pub const NOISE_DIM: u32 = 4;

/// Seed used by the pipeline so every run produces the same kernel
pub const DEFAULT_KERNEL_SEED: u64 = 0x55A0;

/// Hemisphere sample offsets and noise rotations
#[derive(Debug, Clone, PartialEq)]
pub struct SsaoKernel {
    samples: Vec<Vec3>,
    noise: Vec<Vec3>,
}

impl SsaoKernel {
    /// Generate the kernel and noise from `seed`
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let samples = (0..KERNEL_SIZE)
            .map(|i| {
                let direction = Vec3::new(
                    rng.gen::<f32>() * 2.0 - 1.0,
                    rng.gen::<f32>() * 2.0 - 1.0,
                    rng.gen::<f32>(),
                );
                let direction = if direction.norm_squared() > f32::EPSILON {
                    direction.normalize()
                } else {
                    Vec3::z()
                };
                let t = i as f32 / KERNEL_SIZE as f32;
                direction * rng.gen::<f32>() * utils::lerp(0.1, 1.0, t * t)
            })
            .collect();

        let noise = (0..NOISE_DIM * NOISE_DIM)
            .map(|_| {
                let rotation = Vec3::new(rng.gen::<f32>() * 2.0 - 1.0, rng.gen::<f32>() * 2.0 - 1.0, 0.0);
                if rotation.norm_squared() > f32::EPSILON {
                    rotation.normalize()
                } else {
                    Vec3::x()
                }
            })
            .collect();

        Self { samples, noise }
    }

    /// The `KERNEL_SIZE` sample offsets
    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    /// The 16 noise rotations, row-major over the 4×4 tile
    pub fn noise(&self) -> &[Vec3] {
        &self.noise
    }

    /// Noise texels as RGBA `f32` upload data (alpha 0)
    pub fn noise_texels(&self) -> Vec<u8> {
        let texels: Vec<[f32; 4]> = self.noise.iter().map(|n| [n.x, n.y, n.z, 0.0]).collect();
        bytemuck::cast_slice(&texels).to_vec()
    }

    /// Uniform name of sample `index` in the SSAO shader
    pub fn sample_uniform(index: usize) -> String {
        format!("samples[{index}]")
    }
}

/// The repeating noise texture, released on drop
#[derive(Debug)]
pub struct NoiseTexture {
    texture: TextureHandle,
    release: ReleaseQueue,
}

impl NoiseTexture {
    /// Upload the kernel's noise as a 4×4 nearest-filtered repeating texture
    pub fn create(device: &mut dyn GpuDevice, kernel: &SsaoKernel) -> RenderResult<Self> {
        let desc = TextureDesc {
            extent: Extent2D::new(NOISE_DIM, NOISE_DIM),
            format: TextureFormat::Rgba16F,
            filter: FilterMode::Nearest,
            wrap: WrapMode::Repeat,
        };
        let texture = device.create_texture(&desc, Some(&kernel.noise_texels()))?;
        Ok(Self {
            texture,
            release: device.release_queue(),
        })
    }

    /// Texture handle
    pub fn handle(&self) -> TextureHandle {
        self.texture
    }
}

impl Drop for NoiseTexture {
    fn drop(&mut self) {
        self.release.push(GpuResource::Texture(self.texture));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kernel_lies_in_scaled_hemisphere() {
        let kernel = SsaoKernel::generate(DEFAULT_KERNEL_SEED);
        assert_eq!(kernel.samples().len(), KERNEL_SIZE);

        for (i, sample) in kernel.samples().iter().enumerate() {
            let t = i as f32 / KERNEL_SIZE as f32;
            let scale = 0.1 + 0.9 * t * t;
            assert!(sample.z >= 0.0);
            assert!(sample.norm() <= scale + 1e-5);
        }
    }

    #[test]
    fn test_noise_rotates_around_z() {
        let kernel = SsaoKernel::generate(3);
        assert_eq!(kernel.noise().len(), 16);
        for n in kernel.noise() {
            assert_eq!(n.z, 0.0);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-5);
        }
        assert_eq!(kernel.noise_texels().len(), 16 * 4 * 4);
    }

    #[test]
    fn test_kernel_is_deterministic_per_seed() {
        assert_eq!(SsaoKernel::generate(11), SsaoKernel::generate(11));
        assert_ne!(SsaoKernel::generate(11), SsaoKernel::generate(12));
        assert_eq!(SsaoKernel::sample_uniform(5), "samples[5]");
    }
}
