//! CPU frustum culling of point lights
//!
//! Runs once per frame before the cluster kernels. The surviving lights keep
//! their relative order and are uploaded as a full replacement of the light
//! storage buffer, so cluster light indices always refer to this frame's
//! visible list.

use crate::foundation::math::Mat4;
use crate::foundation::time::Stopwatch;
use crate::render::api::{BufferHandle, GpuDevice};
use crate::render::lighting::frustum::Frustum;
use crate::render::lighting::point_light::PointLight;
use crate::render::RenderResult;

/// Lights whose bounding spheres intersect the frustum of `view_projection`
///
/// Output order is input order.
pub fn compute_visible_lights(view_projection: &Mat4, lights: &[PointLight]) -> Vec<PointLight> {
    let frustum = Frustum::from_view_projection(view_projection);
    lights
        .iter()
        .filter(|light| frustum.is_light_visible(light))
        .copied()
        .collect()
}

/// Outcome of one cull
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CullResult {
    /// Lights tested
    pub total: usize,
    /// Lights that survived
    pub visible: usize,
    /// Wall time of the test loop in milliseconds
    pub elapsed_ms: f64,
}

/// Frame-to-frame frustum culler
///
/// Keeps its output vector between frames to avoid reallocating.
#[derive(Debug, Default)]
pub struct LightCuller {
    frustum: Option<Frustum>,
    visible: Vec<PointLight>,
}

impl LightCuller {
    /// Create a culler with no result yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Cull `lights` against `view_projection`, replacing the previous result
    pub fn cull(&mut self, view_projection: &Mat4, lights: &[PointLight]) -> CullResult {
        let mut stopwatch = Stopwatch::start_new();

        let frustum = Frustum::from_view_projection(view_projection);
        self.visible.clear();
        self.visible
            .extend(lights.iter().filter(|light| frustum.is_light_visible(light)).copied());
        self.frustum = Some(frustum);

        let result = CullResult {
            total: lights.len(),
            visible: self.visible.len(),
            elapsed_ms: stopwatch.stop_and_get_ms(),
        };
        log::debug!(
            "Frustum cull: {}/{} lights visible in {:.3} ms",
            result.visible,
            result.total,
            result.elapsed_ms
        );
        result
    }

    /// Lights that survived the last cull
    pub fn visible_lights(&self) -> &[PointLight] {
        &self.visible
    }

    /// Frustum used by the last cull
    pub fn frustum(&self) -> Option<&Frustum> {
        self.frustum.as_ref()
    }

    /// Replace the contents of `buffer` with the visible lights
    pub fn upload(&self, device: &mut dyn GpuDevice, buffer: BufferHandle) -> RenderResult<()> {
        device.write_buffer(buffer, bytemuck::cast_slice(&self.visible))
    }
}
