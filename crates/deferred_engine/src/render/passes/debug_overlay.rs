//! Light position markers drawn over the final image

use crate::core::config::ShaderConfig;
use crate::foundation::math::Vec4;
use crate::render::api::{
    FramebufferTarget, GpuDevice, GpuResource, MeshHandle, ReleaseQueue, UniformValue,
};
use crate::render::passes::pipeline::{DeferredPipeline, FrameStage};
use crate::render::passes::programs::{PassPrograms, ProgramKind};
use crate::render::primitives::{Camera, Mesh};
use crate::render::{RenderError, RenderResult};

/// Edge length of a light marker cube
pub const MARKER_SCALE: f32 = 0.5;

/// Debug drawing of one cube per visible light
///
/// Markers are depth tested against the scene by first copying the geometry
/// buffer's depth into the default framebuffer.
#[derive(Debug)]
pub struct DebugOverlay {
    programs: PassPrograms,
    cube: MeshHandle,
    color: Vec4,
    release: ReleaseQueue,
}

impl DebugOverlay {
    /// Build the marker program and cube mesh
    pub fn new(device: &mut dyn GpuDevice, shaders: &ShaderConfig) -> RenderResult<Self> {
        let programs = PassPrograms::load(device, shaders, &[ProgramKind::DebugMarkers])?;
        let cube = device.create_mesh(&Mesh::cube())?;
        Ok(Self {
            programs,
            cube,
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            release: device.release_queue(),
        })
    }

    /// Marker colour
    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    /// Draw a marker at every light that survived this frame's cull
    ///
    /// Runs after `hdr_pass`; returns the number of markers drawn.
    pub fn show_light_positions(
        &self,
        device: &mut dyn GpuDevice,
        pipeline: &DeferredPipeline,
        camera: &Camera,
    ) -> RenderResult<u32> {
        if pipeline.stage() != FrameStage::Idle {
            return Err(RenderError::PassOrder {
                expected: FrameStage::Idle.name().to_string(),
                found: pipeline.stage().name().to_string(),
            });
        }
        let gbuffer = pipeline.resources()?.gbuffer()?;
        let count = u32::try_from(pipeline.culler().visible_lights().len())
            .map_err(|_| RenderError::InvalidLight("too many lights to draw markers for".to_string()))?;
        if count == 0 {
            return Ok(0);
        }

        let surface = device.surface_extent();
        device.blit_depth(gbuffer.framebuffer(), gbuffer.extent(), FramebufferTarget::Default, surface)?;
        device.bind_framebuffer(FramebufferTarget::Default)?;

        let program = self.programs.get(ProgramKind::DebugMarkers)?;
        device.use_program(program)?;
        device.set_uniform(program, "projection", UniformValue::Mat4(*camera.projection()))?;
        device.set_uniform(program, "view", UniformValue::Mat4(*camera.view()))?;
        device.set_uniform(program, "color", UniformValue::Vec4(self.color))?;
        device.set_uniform(program, "scale", UniformValue::Float(MARKER_SCALE))?;
        device.draw_mesh_instanced(self.cube, count)?;

        Ok(count)
    }
}

impl Drop for DebugOverlay {
    fn drop(&mut self) {
        self.release.push(GpuResource::Mesh(self.cube));
    }
}
