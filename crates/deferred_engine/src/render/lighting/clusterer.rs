//! GPU light clustering
//!
//! [`LightClusterer`] owns the three storage buffers the cluster kernels and
//! the lighting pass share, and dispatches the two kernels each frame:
//!
//! 1. bounds: one invocation per cluster writes its view-space AABB,
//! 2. light cull: every cluster collects the visible lights touching it.
//!
//! A storage barrier follows each dispatch. The bounds only depend on the
//! projection, the near/far planes and the surface size, so with
//! [`ClusterRebuild::OnChange`] phase 1 is skipped while those stay put.

use std::mem::size_of;

use crate::core::config::{ClusterRebuild, ClusterSettings, ShaderConfig};
use crate::foundation::math::Mat4;
use crate::render::api::{
    BarrierFlags, BufferHandle, Extent2D, GpuDevice, GpuResource, ReleaseQueue, UniformValue,
};
use crate::render::lighting::clusters::{ClusterGrid, ClusterStats, GpuCluster};
use crate::render::lighting::{CLUSTER_BINDING, CLUSTER_STATS_BINDING, LIGHT_BINDING};
use crate::render::passes::{PassPrograms, ProgramKind};
use crate::render::primitives::Camera;
use crate::render::{RenderError, RenderResult};

/// Storage buffers shared by the cluster kernels and the lighting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterBuffers {
    /// Cluster grid, binding 1
    pub clusters: BufferHandle,
    /// Visible lights, binding 2
    pub lights: BufferHandle,
    /// Overflow counters, binding 3
    pub stats: BufferHandle,
}

/// What one [`LightClusterer::update`] dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterUpdate {
    /// Whether phase 1 ran
    pub bounds_rebuilt: bool,
    /// Workgroups of the light cull dispatch; zero when nothing ran
    pub cull_groups: [u32; 3],
}

/// Camera inputs the cluster bounds depend on
#[derive(Debug, Clone, Copy, PartialEq)]
struct BoundsKey {
    near: f32,
    far: f32,
    projection: Mat4,
    screen: Extent2D,
}

/// Dispatcher of the cluster kernels
#[derive(Debug)]
pub struct LightClusterer {
    grid: ClusterGrid,
    rebuild: ClusterRebuild,
    programs: PassPrograms,
    buffers: ClusterBuffers,
    bounds_key: Option<BoundsKey>,
    bounds_dispatches: u64,
    release: ReleaseQueue,
}

impl LightClusterer {
    /// Build the kernels and buffers and attach the buffers to their bindings
    pub fn new(device: &mut dyn GpuDevice, settings: &ClusterSettings, shaders: &ShaderConfig) -> RenderResult<Self> {
        if settings.grid.contains(&0) {
            return Err(RenderError::InitializationFailed(format!(
                "cluster grid {:?} has an empty axis",
                settings.grid
            )));
        }
        let grid = ClusterGrid::new(settings.grid);
        let release = device.release_queue();

        let programs = PassPrograms::load(
            device,
            shaders,
            &[ProgramKind::ClusterBounds, ProgramKind::ClusterLightCull],
        )?;

        let mut created = Vec::with_capacity(3);
        for size in [grid.buffer_size(), 0, size_of::<ClusterStats>()] {
            match device.create_buffer(size) {
                Ok(buffer) => created.push(buffer),
                Err(e) => {
                    release.extend(created.into_iter().map(GpuResource::Buffer));
                    return Err(RenderError::InitializationFailed(format!(
                        "failed to create cluster storage: {e}"
                    )));
                }
            }
        }

        let clusterer = Self {
            grid,
            rebuild: settings.rebuild,
            programs,
            buffers: ClusterBuffers {
                clusters: created[0],
                lights: created[1],
                stats: created[2],
            },
            bounds_key: None,
            bounds_dispatches: 0,
            release,
        };
        clusterer.bind(device)?;

        log::info!(
            "Light clusterer ready: {}x{}x{} grid, {} clusters ({} bytes)",
            grid.dims[0],
            grid.dims[1],
            grid.dims[2],
            grid.count(),
            grid.buffer_size()
        );
        Ok(clusterer)
    }

    /// Attach the storage buffers to bindings 1, 2 and 3
    pub fn bind(&self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        device.bind_storage_buffer(CLUSTER_BINDING, self.buffers.clusters)?;
        device.bind_storage_buffer(LIGHT_BINDING, self.buffers.lights)?;
        device.bind_storage_buffer(CLUSTER_STATS_BINDING, self.buffers.stats)
    }

    /// Run the cluster kernels for this frame
    ///
    /// The visible lights must already be in [`ClusterBuffers::lights`].
    /// Nothing is dispatched for an empty surface.
    pub fn update(&mut self, device: &mut dyn GpuDevice, camera: &Camera, screen: Extent2D) -> RenderResult<ClusterUpdate> {
        if screen.is_empty() {
            log::debug!("Skipping light clustering for an empty surface");
            return Ok(ClusterUpdate::default());
        }

        let key = BoundsKey {
            near: camera.near,
            far: camera.far,
            projection: *camera.projection(),
            screen,
        };
        let bounds_rebuilt = self.rebuild == ClusterRebuild::EveryFrame || self.bounds_key != Some(key);
        if bounds_rebuilt {
            self.dispatch_bounds(device, &key)?;
        }

        device.write_buffer(self.buffers.stats, bytemuck::bytes_of(&ClusterStats::default()))?;

        let cull = self.programs.get(ProgramKind::ClusterLightCull)?;
        let cull_groups = self.grid.cull_groups();
        device.use_program(cull)?;
        device.set_uniform(cull, "viewMatrix", UniformValue::Mat4(*camera.view()))?;
        device.dispatch_compute(cull_groups)?;
        device.memory_barrier(BarrierFlags::SHADER_STORAGE);

        log::trace!("Light cull dispatched as {cull_groups:?} groups, bounds rebuilt: {bounds_rebuilt}");
        Ok(ClusterUpdate {
            bounds_rebuilt,
            cull_groups,
        })
    }

    fn dispatch_bounds(&mut self, device: &mut dyn GpuDevice, key: &BoundsKey) -> RenderResult<()> {
        let inverse_projection = key
            .projection
            .try_inverse()
            .ok_or_else(|| RenderError::BackendError("projection matrix is not invertible".to_string()))?;

        let program = self.programs.get(ProgramKind::ClusterBounds)?;
        device.use_program(program)?;
        device.set_uniform(program, "zNear", UniformValue::Float(key.near))?;
        device.set_uniform(program, "zFar", UniformValue::Float(key.far))?;
        device.set_uniform(program, "inverseProjection", UniformValue::Mat4(inverse_projection))?;
        device.set_uniform(program, "gridSize", UniformValue::UVec3(self.grid.dims))?;
        device.set_uniform(program, "screenDimensions", UniformValue::UVec2(key.screen.to_array()))?;
        device.dispatch_compute(self.grid.dims)?;
        device.memory_barrier(BarrierFlags::SHADER_STORAGE);

        self.bounds_key = Some(*key);
        self.bounds_dispatches += 1;
        log::debug!(
            "Cluster bounds rebuilt for {}x{}, near {}, far {}",
            key.screen.width,
            key.screen.height,
            key.near,
            key.far
        );
        Ok(())
    }

    /// Force phase 1 on the next update
    pub fn invalidate_bounds(&mut self) {
        self.bounds_key = None;
    }

    /// Lights dropped by full clusters during the last update
    pub fn read_overflow_count(&self, device: &mut dyn GpuDevice) -> RenderResult<u32> {
        let bytes = device.read_buffer(self.buffers.stats)?;
        let size = size_of::<ClusterStats>();
        if bytes.len() < size {
            return Err(RenderError::BackendError(format!(
                "cluster stats buffer holds {} bytes, expected {size}",
                bytes.len()
            )));
        }
        let stats: ClusterStats = bytemuck::pod_read_unaligned(&bytes[..size]);
        Ok(stats.overflow_count)
    }

    /// Read the whole cluster grid back
    pub fn read_clusters(&self, device: &mut dyn GpuDevice) -> RenderResult<Vec<GpuCluster>> {
        let bytes = device.read_buffer(self.buffers.clusters)?;
        Ok(bytes
            .chunks_exact(size_of::<GpuCluster>())
            .map(bytemuck::pod_read_unaligned::<GpuCluster>)
            .collect())
    }

    /// Storage buffers
    pub fn buffers(&self) -> &ClusterBuffers {
        &self.buffers
    }

    /// Grid layout
    pub fn grid(&self) -> ClusterGrid {
        self.grid
    }

    /// Bounds rebuild policy
    pub fn rebuild_policy(&self) -> ClusterRebuild {
        self.rebuild
    }

    /// Number of times phase 1 has run
    pub fn bounds_dispatch_count(&self) -> u64 {
        self.bounds_dispatches
    }
}

impl Drop for LightClusterer {
    fn drop(&mut self) {
        let ClusterBuffers { clusters, lights, stats } = self.buffers;
        self.release.extend([clusters, lights, stats].map(GpuResource::Buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessDevice;
    use crate::render::lighting::clusters::{assign_lights, build_cluster_bounds, ClusterParams};
    use crate::render::lighting::PointLight;
    use approx::assert_relative_eq;

    const SCREEN: Extent2D = Extent2D { width: 640, height: 360 };

    fn settings(rebuild: ClusterRebuild) -> ClusterSettings {
        ClusterSettings { grid: [4, 4, 8], rebuild }
    }

    fn setup(rebuild: ClusterRebuild) -> (HeadlessDevice, LightClusterer, Camera) {
        let mut device = HeadlessDevice::new(SCREEN);
        let clusterer =
            LightClusterer::new(&mut device, &settings(rebuild), &ShaderConfig::new("resources/shaders")).unwrap();
        let mut camera = Camera::new(Vec3::zeros());
        camera.update_matrices(SCREEN);
        (device, clusterer, camera)
    }

    fn upload(device: &mut HeadlessDevice, clusterer: &LightClusterer, lights: &[PointLight]) {
        device.write_buffer(clusterer.buffers().lights, bytemuck::cast_slice(lights)).unwrap();
    }

    fn light(x: f32, y: f32, z: f32, radius: f32) -> PointLight {
        PointLight::new(Vec3::new(x, y, z), Vec3::new(1.0, 1.0, 1.0), 1.0, radius)
    }

    #[test]
    fn test_buffers_are_bound_on_creation() {
        let (device, clusterer, _) = setup(ClusterRebuild::OnChange);
        let buffers = *clusterer.buffers();
        assert_eq!(device.storage_binding(CLUSTER_BINDING), Some(buffers.clusters));
        assert_eq!(device.storage_binding(LIGHT_BINDING), Some(buffers.lights));
        assert_eq!(device.storage_binding(CLUSTER_STATS_BINDING), Some(buffers.stats));
        assert_eq!(device.live_resource_count(), 5);
    }

    #[test]
    fn test_empty_grid_axis_is_rejected() {
        let mut device = HeadlessDevice::new(SCREEN);
        let settings = ClusterSettings { grid: [4, 0, 8], rebuild: ClusterRebuild::OnChange };
        let result = LightClusterer::new(&mut device, &settings, &ShaderConfig::new("resources/shaders"));
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    }

    #[test]
    fn test_bounds_rebuild_only_on_camera_change() {
        let (mut device, mut clusterer, mut camera) = setup(ClusterRebuild::OnChange);

        assert!(clusterer.update(&mut device, &camera, SCREEN).unwrap().bounds_rebuilt);
        assert!(!clusterer.update(&mut device, &camera, SCREEN).unwrap().bounds_rebuilt);

        camera.position = Vec3::new(3.0, 1.0, 2.0);
        camera.update_matrices(SCREEN);
        assert!(!clusterer.update(&mut device, &camera, SCREEN).unwrap().bounds_rebuilt);

        camera.far = 200.0;
        camera.update_matrices(SCREEN);
        assert!(clusterer.update(&mut device, &camera, SCREEN).unwrap().bounds_rebuilt);

        let resized = Extent2D::new(320, 180);
        assert!(clusterer.update(&mut device, &camera, resized).unwrap().bounds_rebuilt);
        assert_eq!(clusterer.bounds_dispatch_count(), 3);

        clusterer.invalidate_bounds();
        assert!(clusterer.update(&mut device, &camera, resized).unwrap().bounds_rebuilt);
    }

    #[test]
    fn test_every_frame_policy_always_rebuilds() {
        let (mut device, mut clusterer, camera) = setup(ClusterRebuild::EveryFrame);
        for _ in 0..3 {
            assert!(clusterer.update(&mut device, &camera, SCREEN).unwrap().bounds_rebuilt);
        }
        assert_eq!(clusterer.bounds_dispatch_count(), 3);
    }

    #[test]
    fn test_dispatch_matches_cpu_reference() {
        let (mut device, mut clusterer, camera) = setup(ClusterRebuild::OnChange);
        let lights = [
            light(0.0, 0.0, -5.0, 2.0),
            light(4.0, 1.0, -20.0, 6.0),
            light(-3.0, -2.0, -60.0, 13.0),
            light(0.0, 0.0, 10.0, 1.0),
        ];
        upload(&mut device, &clusterer, &lights);
        let update = clusterer.update(&mut device, &camera, SCREEN).unwrap();
        assert_eq!(update.cull_groups, [1, 1, 1]);

        let params = ClusterParams {
            inverse_projection: camera.projection().try_inverse().unwrap(),
            near: camera.near,
            far: camera.far,
            screen: SCREEN,
            grid: clusterer.grid(),
        };
        let mut expected = vec![GpuCluster::default(); clusterer.grid().count()];
        build_cluster_bounds(&params, &mut expected);
        assert_eq!(assign_lights(&mut expected, &lights, camera.view()), 0);

        let actual = clusterer.read_clusters(&mut device).unwrap();
        assert_eq!(actual.len(), expected.len());
        for (gpu, cpu) in actual.iter().zip(&expected) {
            assert_relative_eq!(gpu.min(), cpu.min(), epsilon = 1e-5);
            assert_relative_eq!(gpu.max(), cpu.max(), epsilon = 1e-5);
            assert_eq!(gpu.lights(), cpu.lights());
        }
        assert!(actual.iter().any(|c| c.count > 0));
        assert!(actual.iter().all(|c| !c.lights().contains(&3)));
        assert!(device.hazards().is_empty());
    }

    #[test]
    fn test_overflow_is_counted_per_update() {
        let (mut device, mut clusterer, camera) = setup(ClusterRebuild::OnChange);
        let lights = vec![light(0.0, 0.0, -20.0, 0.5); 150];
        upload(&mut device, &clusterer, &lights);

        clusterer.update(&mut device, &camera, SCREEN).unwrap();
        let first = clusterer.read_overflow_count(&mut device).unwrap();
        assert!(first >= 50);
        assert_eq!(first % 50, 0);

        let clusters = clusterer.read_clusters(&mut device).unwrap();
        assert!(clusters.iter().all(|c| c.count as usize <= crate::render::lighting::CLUSTER_LIGHT_CAPACITY));

        clusterer.update(&mut device, &camera, SCREEN).unwrap();
        assert_eq!(clusterer.read_overflow_count(&mut device).unwrap(), first);
    }

    #[test]
    fn test_empty_surface_dispatches_nothing() {
        let (mut device, mut clusterer, camera) = setup(ClusterRebuild::OnChange);
        device.take_commands();
        let update = clusterer.update(&mut device, &camera, Extent2D::new(0, 0)).unwrap();
        assert_eq!(update, ClusterUpdate::default());
        assert!(device.commands().is_empty());
    }

    #[test]
    fn test_drop_releases_buffers_and_programs() {
        let (mut device, clusterer, _) = setup(ClusterRebuild::OnChange);
        drop(clusterer);
        assert_eq!(device.collect_released(), 5);
        assert_eq!(device.live_resource_count(), 0);
    }
}
