//! Rendering system
//!
//! The clustered-deferred renderer: a backend-agnostic GPU seam, CPU-side
//! frustum culling, the two-phase light clusterer, the frame resource manager
//! and the pass orchestrator that sequences them.
//!
//! # Frame Flow
//!
//! ```text
//! Camera ─► LightCuller ─► LightClusterer (compute) ─► DeferredPipeline passes ─► backbuffer
//!                                                    geometry → SSAO → lighting → tonemap
//! ```
//!
//! Everything above the [`api::GpuDevice`] trait is free of graphics-API
//! types; [`backends::headless::HeadlessDevice`] implements the trait in
//! software so the whole frame can be driven without a GPU.

pub mod api;
pub mod backends;
pub mod lighting;
pub mod passes;
pub mod primitives;
pub mod stats;
pub mod targets;

pub use api::{
    BarrierFlags, ClearFlags, Extent2D, FramebufferTarget, GpuDevice, ProgramHandle, UniformValue,
};
pub use lighting::{Frustum, LightClusterer, LightCuller, LightSet, PointLight};
pub use passes::{DebugOverlay, DeferredPipeline, FrameStage, ProgramKind};
pub use primitives::{Camera, MoveType};
pub use stats::FrameStats;
pub use targets::{FrameResources, ReconcileReport, RenderTarget};

use thiserror::Error;

/// Rendering system errors
///
/// Conditions the renderer tolerates (incomplete framebuffers, cluster
/// overflow) are not represented here; they are logged and counted in
/// [`FrameStats`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// Resource creation or management failed
    ///
    /// Occurs when GPU resources (buffers, textures, programs) cannot be
    /// created, typically because a descriptor references missing resources.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),

    /// A handle does not name a live resource
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A pipeline stage was invoked out of order
    ///
    /// The frame sequence is fixed; the device is not touched when this is
    /// returned.
    #[error("Pass called out of order: expected {expected}, found {found}")]
    PassOrder {
        /// Stage(s) the called operation requires
        expected: String,
        /// Stage the pipeline was actually in
        found: String,
    },

    /// The pipeline was used before `init()`
    #[error("Pipeline used before initialization")]
    NotInitialized,

    /// A point light violates its invariants
    #[error("Invalid light: {0}")]
    InvalidLight(String),

    /// A render target was requested with an unusable resolution
    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
