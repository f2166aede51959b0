//! # Deferred Engine
//!
//! A clustered deferred renderer: geometry buffer, screen-space ambient
//! occlusion, CPU frustum culling of point lights, GPU light clustering and
//! HDR tone mapping, driven through a backend-agnostic device trait.
//!
//! ## Features
//!
//! - **Deferred shading**: position, normal and albedo/specular targets
//!   resolved by one fullscreen lighting pass
//! - **Clustered lighting**: a 3D grid of view-space clusters built and
//!   filled by two compute kernels
//! - **Frustum culling**: Gribb–Hartmann plane extraction and sphere tests
//! - **Headless backend**: the whole frame runs without a GPU for tests and
//!   tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deferred_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let surface = Extent2D::new(1280, 720);
//!     let mut device = HeadlessDevice::new(surface);
//!     let mut pipeline = DeferredPipeline::new(RenderConfig::from_preset(QualityPreset::High))?;
//!     pipeline.init(&mut device)?;
//!
//!     let lights = LightSet::scatter(1024, 7);
//!     let mut camera = Camera::new(Vec3::new(0.0, 10.0, 0.0));
//!     camera.update_matrices(surface);
//!
//!     pipeline.cull_lights(&mut device, &camera, &lights)?;
//!     pipeline.pre_render_checks(&mut device)?;
//!     let _geometry = pipeline.begin_gbuffer_render(&mut device)?;
//!     // draw the scene here
//!     pipeline.end_gbuffer_render(&mut device)?;
//!     pipeline.ssao_pass(&mut device, camera.projection())?;
//!     let _lighting = pipeline.begin_lighting_pass(&mut device)?;
//!     pipeline.end_lighting_pass(&mut device)?;
//!     pipeline.hdr_pass(&mut device)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::Config,
        core::config::{
            ApplicationConfig, ClusterRebuild, ClusterSettings, QualityPreset, RenderConfig, Resolution,
            ShaderConfig, SsaoSettings, ToneMapSettings,
        },
        foundation::{
            math::{Mat4, Vec3, Vec4},
            time::{Stopwatch, Timer},
        },
        render::{
            backends::HeadlessDevice, Camera, DebugOverlay, DeferredPipeline, Extent2D, FrameStage,
            FrameStats, GpuDevice, LightSet, MoveType, PointLight, RenderError, RenderResult,
        },
    };
}
