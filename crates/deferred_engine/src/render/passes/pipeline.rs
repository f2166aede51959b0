//! The frame orchestrator
//!
//! [`DeferredPipeline`] owns every GPU resource a frame needs (render
//! targets, pass programs, SSAO noise, the light clusterer) and a small
//! state machine that enforces the pass order. It never walks the scene:
//! the geometry and lighting stages hand the program back to the caller,
//! who sets per-draw uniforms and issues the draws.

use std::fmt;

use crate::core::config::{RenderConfig, Resolution, SsaoSettings, ToneMapSettings};
use crate::foundation::math::Mat4;
use crate::render::api::{
    ClearFlags, FramebufferTarget, GpuDevice, PolygonMode, ProgramHandle, UniformValue,
};
use crate::render::lighting::{CullResult, LightClusterer, LightCuller, LightSet};
use crate::render::passes::programs::{PassPrograms, ProgramKind};
use crate::render::passes::ssao::{NoiseTexture, SsaoKernel, DEFAULT_KERNEL_SEED};
use crate::render::primitives::Camera;
use crate::render::stats::FrameStats;
use crate::render::targets::{FrameResources, ReconcileReport};
use crate::render::{RenderError, RenderResult};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Where the pipeline is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    /// Between frames; lights may be culled
    Idle,
    /// Targets reconciled, geometry pass may begin
    Ready,
    /// Geometry pass recording
    GeometryPass,
    /// Geometry pass finished
    GeometryDone,
    /// SSAO finished (or skipped)
    SsaoDone,
    /// Lighting pass recording
    LightingPass,
    /// Lighting resolved into the HDR target
    LightingDone,
}

impl FrameStage {
    /// Short name used in errors
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::GeometryPass => "geometry pass",
            Self::GeometryDone => "geometry done",
            Self::SsaoDone => "ssao done",
            Self::LightingPass => "lighting pass",
            Self::LightingDone => "lighting done",
        }
    }
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// GPU state created by `init`
#[derive(Debug)]
struct GpuState {
    resources: FrameResources,
    programs: PassPrograms,
    clusterer: LightClusterer,
    noise: NoiseTexture,
}

/// Clustered deferred renderer
#[derive(Debug)]
pub struct DeferredPipeline {
    config: RenderConfig,
    kernel: SsaoKernel,
    culler: LightCuller,
    gpu: Option<GpuState>,
    stage: FrameStage,
    stats: FrameStats,
    frames: u64,
}

impl DeferredPipeline {
    /// Create an uninitialised pipeline for `config`
    pub fn new(config: RenderConfig) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        Ok(Self {
            config,
            kernel: SsaoKernel::generate(DEFAULT_KERNEL_SEED),
            culler: LightCuller::new(),
            gpu: None,
            stage: FrameStage::Idle,
            stats: FrameStats::default(),
            frames: 0,
        })
    }

    /// Create programs, targets, noise and cluster storage
    ///
    /// Sampler units and the SSAO kernel are written to their programs
    /// here, once.
    pub fn init(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        if self.gpu.is_some() {
            return Err(RenderError::InitializationFailed("pipeline is already initialized".to_string()));
        }

        match Self::create_gpu_state(device, &self.config, &self.kernel) {
            Ok(gpu) => {
                self.stats.incomplete_framebuffers = gpu.resources.incomplete_targets().len();
                self.gpu = Some(gpu);
                self.stage = FrameStage::Idle;
                log::info!(
                    "Deferred pipeline initialized: gbuffer {}, ssao {} ({})",
                    self.config.gbuffer_resolution,
                    self.config.ssao_resolution,
                    if self.config.ssao.enabled { "enabled" } else { "disabled" }
                );
                Ok(())
            }
            Err(e) => {
                device.collect_released();
                log::error!("Deferred pipeline initialization failed: {e}");
                Err(e)
            }
        }
    }

    fn create_gpu_state(device: &mut dyn GpuDevice, config: &RenderConfig, kernel: &SsaoKernel) -> RenderResult<GpuState> {
        let programs = PassPrograms::load(device, &config.shaders, &ProgramKind::PASSES)?;

        let ssao = programs.get(ProgramKind::Ssao)?;
        for (i, sample) in kernel.samples().iter().enumerate() {
            device.set_uniform(ssao, &SsaoKernel::sample_uniform(i), UniformValue::Vec3(*sample))?;
        }

        let noise = NoiseTexture::create(device, kernel)?;
        let resources = FrameResources::create(
            device,
            config.gbuffer_resolution.extent(),
            config.ssao_resolution.extent(),
        )?;
        let clusterer = LightClusterer::new(device, &config.clusters, &config.shaders)?;

        Ok(GpuState {
            resources,
            programs,
            clusterer,
            noise,
        })
    }

    fn check_stage(&self, allowed: &[FrameStage]) -> RenderResult<&GpuState> {
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotInitialized)?;
        if allowed.contains(&self.stage) {
            Ok(gpu)
        } else {
            Err(RenderError::PassOrder {
                expected: allowed.iter().map(|s| s.name()).collect::<Vec<_>>().join(" or "),
                found: self.stage.name().to_string(),
            })
        }
    }

    /// Frustum-cull `lights`, upload the survivors and run the cluster kernels
    ///
    /// The camera's matrices must be current for the surface size.
    pub fn cull_lights(&mut self, device: &mut dyn GpuDevice, camera: &Camera, lights: &LightSet) -> RenderResult<CullResult> {
        self.check_stage(&[FrameStage::Idle, FrameStage::Ready])?;
        let gpu = self.gpu.as_mut().ok_or(RenderError::NotInitialized)?;

        let surface = device.surface_extent();
        let result = self.culler.cull(&camera.view_projection(), lights.as_slice());
        self.culler.upload(device, gpu.clusterer.buffers().lights)?;
        let update = gpu.clusterer.update(device, camera, surface)?;

        self.stats.cull_ms = result.elapsed_ms;
        self.stats.visible_lights = result.visible;
        self.stats.total_lights = result.total;
        self.stats.bounds_rebuilt = update.bounds_rebuilt;
        Ok(result)
    }

    /// Rebuild targets whose size changed
    ///
    /// Calling it again with nothing changed recreates nothing.
    pub fn pre_render_checks(&mut self, device: &mut dyn GpuDevice) -> RenderResult<ReconcileReport> {
        self.check_stage(&[FrameStage::Idle, FrameStage::Ready])?;
        let gpu = self.gpu.as_mut().ok_or(RenderError::NotInitialized)?;

        let report = gpu.resources.reconcile(device)?;
        if !report.incomplete.is_empty() {
            log::error!("Rendering continues with incomplete targets: {:?}", report.incomplete);
        }

        self.stats.targets_recreated = report.recreated.len();
        self.stats.incomplete_framebuffers = gpu.resources.incomplete_targets().len();
        self.stage = FrameStage::Ready;
        Ok(report)
    }

    /// Bind and clear the geometry buffer; returns the geometry program
    ///
    /// The caller sets `view`, `projection` and per-mesh `model` and draws.
    pub fn begin_gbuffer_render(&mut self, device: &mut dyn GpuDevice) -> RenderResult<ProgramHandle> {
        let gpu = self.check_stage(&[FrameStage::Ready])?;
        let gbuffer = gpu.resources.gbuffer()?;
        let program = gpu.programs.get(ProgramKind::GeometryPass)?;

        device.set_viewport(gbuffer.extent());
        device.bind_framebuffer(FramebufferTarget::Offscreen(gbuffer.framebuffer()))?;
        device.clear(CLEAR_COLOR, ClearFlags::COLOR | ClearFlags::DEPTH);
        if self.config.wireframe {
            device.set_polygon_mode(PolygonMode::Line);
        }
        device.set_face_culling(self.config.cull_backfaces);
        device.use_program(program)?;

        self.stage = FrameStage::GeometryPass;
        Ok(program)
    }

    /// Restore the surface viewport and fill mode
    pub fn end_gbuffer_render(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.check_stage(&[FrameStage::GeometryPass])?;

        let surface = device.surface_extent();
        device.set_viewport(surface);
        device.set_polygon_mode(PolygonMode::Fill);

        self.stage = FrameStage::GeometryDone;
        Ok(())
    }

    /// Generate and blur ambient occlusion
    ///
    /// With SSAO disabled this only advances the stage: neither SSAO target
    /// is bound, cleared or drawn into.
    pub fn ssao_pass(&mut self, device: &mut dyn GpuDevice, projection: &Mat4) -> RenderResult<()> {
        let gpu = self.check_stage(&[FrameStage::GeometryDone])?;

        if !self.config.ssao.enabled {
            log::trace!("SSAO disabled, skipping pass");
            self.stage = FrameStage::SsaoDone;
            return Ok(());
        }

        let gbuffer = gpu.resources.gbuffer()?;
        let ssao = gpu.resources.ssao()?;
        let blur = gpu.resources.ssao_blur()?;
        let ssao_program = gpu.programs.get(ProgramKind::Ssao)?;
        let blur_program = gpu.programs.get(ProgramKind::SsaoBlur)?;
        let settings = &self.config.ssao;
        let surface = device.surface_extent();

        device.set_viewport(ssao.extent());
        device.bind_framebuffer(FramebufferTarget::Offscreen(ssao.framebuffer()))?;
        device.clear(CLEAR_COLOR, ClearFlags::COLOR);
        device.use_program(ssao_program)?;
        device.set_uniform(ssao_program, "projection", UniformValue::Mat4(*projection))?;
        device.set_uniform(ssao_program, "kernelSize", UniformValue::Int(settings.samples))?;
        device.set_uniform(ssao_program, "radius", UniformValue::Float(settings.radius))?;
        device.set_uniform(ssao_program, "bias", UniformValue::Float(settings.bias))?;
        device.set_uniform(ssao_program, "power", UniformValue::Float(settings.power))?;
        device.set_uniform(ssao_program, "screenDimensions", UniformValue::UVec2(surface.to_array()))?;
        device.bind_texture(0, gbuffer.color(0)?)?;
        device.bind_texture(1, gbuffer.color(1)?)?;
        device.bind_texture(2, gpu.noise.handle())?;
        device.draw_fullscreen_quad()?;

        device.bind_framebuffer(FramebufferTarget::Offscreen(blur.framebuffer()))?;
        device.clear(CLEAR_COLOR, ClearFlags::COLOR);
        device.use_program(blur_program)?;
        device.bind_texture(0, ssao.color(0)?)?;
        device.draw_fullscreen_quad()?;

        device.set_viewport(surface);
        self.stage = FrameStage::SsaoDone;
        Ok(())
    }

    /// Bind the HDR target and lighting inputs; returns the lighting program
    ///
    /// The caller sets `zNear`, `zFar` and `view` before
    /// [`DeferredPipeline::end_lighting_pass`].
    pub fn begin_lighting_pass(&mut self, device: &mut dyn GpuDevice) -> RenderResult<ProgramHandle> {
        let gpu = self.check_stage(&[FrameStage::SsaoDone])?;
        let hdr = gpu.resources.hdr()?;
        let gbuffer = gpu.resources.gbuffer()?;
        let blur = gpu.resources.ssao_blur()?;
        let program = gpu.programs.get(ProgramKind::LightingPass)?;
        let surface = device.surface_extent();

        device.set_viewport(hdr.extent());
        device.bind_framebuffer(FramebufferTarget::Offscreen(hdr.framebuffer()))?;
        device.clear(CLEAR_COLOR, ClearFlags::COLOR | ClearFlags::DEPTH);
        device.use_program(program)?;
        for unit in 0..3 {
            device.bind_texture(unit, gbuffer.color(unit as usize)?)?;
        }
        device.bind_texture(3, blur.color(0)?)?;
        device.set_uniform(program, "enableSSAO", UniformValue::Bool(self.config.ssao.enabled))?;
        device.set_uniform(program, "gridSize", UniformValue::UVec3(gpu.clusterer.grid().dims))?;
        device.set_uniform(program, "screenDimensions", UniformValue::UVec2(surface.to_array()))?;

        self.stage = FrameStage::LightingPass;
        Ok(program)
    }

    /// Resolve lighting with one fullscreen draw
    pub fn end_lighting_pass(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.check_stage(&[FrameStage::LightingPass])?;
        device.draw_fullscreen_quad()?;
        self.stage = FrameStage::LightingDone;
        Ok(())
    }

    /// Tone map the HDR target onto the default framebuffer
    pub fn hdr_pass(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        let gpu = self.check_stage(&[FrameStage::LightingDone])?;
        let hdr = gpu.resources.hdr()?;
        let program = gpu.programs.get(ProgramKind::ToneMap)?;
        let tonemap = self.config.tonemap;

        device.bind_framebuffer(FramebufferTarget::Default)?;
        device.use_program(program)?;
        device.bind_texture(0, hdr.color(0)?)?;
        device.set_uniform(program, "exposure", UniformValue::Float(tonemap.exposure))?;
        device.set_uniform(program, "gamma", UniformValue::Float(tonemap.gamma))?;
        device.draw_fullscreen_quad()?;

        self.stage = FrameStage::Idle;
        self.frames += 1;
        Ok(())
    }

    /// Read the cluster overflow counter into the frame stats
    ///
    /// Forces a readback, so it is meant for diagnostics rather than every
    /// frame.
    pub fn read_cluster_overflow(&mut self, device: &mut dyn GpuDevice) -> RenderResult<u32> {
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotInitialized)?;
        let dropped = gpu.clusterer.read_overflow_count(device)?;
        if dropped > 0 {
            log::warn!("{dropped} light assignments dropped by full clusters");
        }
        self.stats.cluster_overflows = dropped;
        Ok(dropped)
    }

    /// Toggle line rasterization for the geometry pass
    pub fn set_wireframe(&mut self, enabled: bool) {
        self.config.wireframe = enabled;
    }

    /// Toggle back-face culling for the geometry pass
    pub fn set_backface_culling(&mut self, enabled: bool) {
        self.config.cull_backfaces = enabled;
    }

    /// SSAO parameters, read at the next `ssao_pass`
    pub fn ssao_settings_mut(&mut self) -> &mut SsaoSettings {
        &mut self.config.ssao
    }

    /// Exposure and gamma, read at the next `hdr_pass`
    pub fn tonemap_mut(&mut self) -> &mut ToneMapSettings {
        &mut self.config.tonemap
    }

    /// Change the SSAO backing resolution; returns whether it changed
    ///
    /// The targets are rebuilt by the next `pre_render_checks`.
    pub fn set_ssao_resolution(&mut self, resolution: Resolution) -> bool {
        let changed = self.config.ssao_resolution != resolution;
        self.config.ssao_resolution = resolution;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resources.set_ssao_extent(resolution.extent());
        }
        changed
    }

    /// Change the geometry buffer resolution; returns whether it changed
    pub fn set_gbuffer_resolution(&mut self, resolution: Resolution) -> bool {
        let changed = self.config.gbuffer_resolution != resolution;
        self.config.gbuffer_resolution = resolution;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resources.set_gbuffer_extent(resolution.extent());
        }
        changed
    }

    /// Whether `init` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Current stage
    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Active configuration
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Statistics of the frame in progress (or the last one)
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Frames completed by `hdr_pass`
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// SSAO sample kernel
    pub fn ssao_kernel(&self) -> &SsaoKernel {
        &self.kernel
    }

    /// Frustum culler and its last result
    pub fn culler(&self) -> &LightCuller {
        &self.culler
    }

    /// Render targets
    pub fn resources(&self) -> RenderResult<&FrameResources> {
        self.gpu.as_ref().map(|gpu| &gpu.resources).ok_or(RenderError::NotInitialized)
    }

    /// Light clusterer
    pub fn clusterer(&self) -> RenderResult<&LightClusterer> {
        self.gpu.as_ref().map(|gpu| &gpu.clusterer).ok_or(RenderError::NotInitialized)
    }

    /// Handle of one of the pass programs
    pub fn program(&self, kind: ProgramKind) -> RenderResult<ProgramHandle> {
        self.gpu.as_ref().ok_or(RenderError::NotInitialized)?.programs.get(kind)
    }
}
