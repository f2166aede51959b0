//! Deferred release of GPU resources
//!
//! Render targets own their GPU handles and give them back when dropped. A
//! `Drop` impl cannot borrow the device, so handles go onto a shared
//! [`ReleaseQueue`] and [`GpuDevice::collect_released`] destroys them at the
//! next safe point. Every acquire is therefore paired with exactly one
//! release, whether the owner is dropped at scope exit or replaced during a
//! rebuild.
//!
//! [`GpuDevice::collect_released`]: crate::render::api::GpuDevice::collect_released

use std::cell::RefCell;
use std::rc::Rc;

use crate::render::api::device::{
    BufferHandle, FramebufferHandle, MeshHandle, ProgramHandle, RenderbufferHandle, TextureHandle,
};

/// Any GPU resource a device can destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    /// Framebuffer object
    Framebuffer(FramebufferHandle),
    /// Texture
    Texture(TextureHandle),
    /// Renderbuffer
    Renderbuffer(RenderbufferHandle),
    /// Storage buffer
    Buffer(BufferHandle),
    /// Mesh
    Mesh(MeshHandle),
    /// Program
    Program(ProgramHandle),
}

/// Shared list of resources waiting to be destroyed
///
/// Cloning yields another handle to the same queue. Rendering is single
/// threaded, so the queue is `Rc`-based and not `Send`.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Rc<RefCell<Vec<GpuResource>>>,
}

impl ReleaseQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one resource for destruction
    pub fn push(&self, resource: GpuResource) {
        self.pending.borrow_mut().push(resource);
    }

    /// Queue several resources, preserving order
    pub fn extend(&self, resources: impl IntoIterator<Item = GpuResource>) {
        self.pending.borrow_mut().extend(resources);
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Vec<GpuResource> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    /// Number of resources waiting
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}
