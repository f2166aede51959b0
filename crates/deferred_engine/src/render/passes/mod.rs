//! Deferred pass orchestration
//!
//! [`DeferredPipeline`] sequences one frame:
//!
//! ```text
//! cull_lights → pre_render_checks → begin_gbuffer_render … end_gbuffer_render
//!             → ssao_pass → begin_lighting_pass … end_lighting_pass → hdr_pass
//! ```
//!
//! Calling a stage out of order returns [`crate::render::RenderError::PassOrder`]
//! without touching the device.

pub mod debug_overlay;
pub mod pipeline;
pub mod programs;
pub mod ssao;

#[cfg(test)]
mod pipeline_tests;

pub use debug_overlay::{DebugOverlay, MARKER_SCALE};
pub use pipeline::{DeferredPipeline, FrameStage};
pub use programs::{PassPrograms, ProgramKind, SCREENSPACE_VERTEX};
pub use ssao::{NoiseTexture, SsaoKernel, KERNEL_SIZE, NOISE_DIM};
