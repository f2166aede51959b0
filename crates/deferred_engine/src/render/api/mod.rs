//! Backend abstraction for the rendering system
//!
//! This module defines the types and the [`GpuDevice`] trait every backend
//! implements. The pipeline, culler, clusterer and resource manager only talk
//! to the GPU through this seam.

pub mod device;
pub mod release;

pub use device::{
    BackendResult, BarrierFlags, BufferHandle, ClearFlags, Extent2D, FilterMode,
    FramebufferDesc, FramebufferHandle, FramebufferStatus, FramebufferTarget, GpuDevice,
    MeshHandle, PolygonMode, ProgramDesc, ProgramHandle, RenderbufferDesc, RenderbufferFormat,
    RenderbufferHandle, ShaderSource, ShaderStage, StorageAccess, StorageUsage, TextureDesc,
    TextureFormat, TextureHandle, UniformValue, WrapMode,
};
pub use release::{GpuResource, ReleaseQueue};
