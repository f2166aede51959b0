//! Offscreen render targets
//!
//! [`RenderTarget`] owns one framebuffer and its attachments;
//! [`FrameResources`] owns the four targets of the deferred pipeline and
//! rebuilds them when their size inputs change.

pub mod frame_resources;
pub mod render_target;

pub use frame_resources::{FrameResources, ReconcileReport, TargetDirty, TargetKind};
pub use render_target::{RenderTarget, RenderTargetDesc, MAX_TARGET_DIMENSION};
