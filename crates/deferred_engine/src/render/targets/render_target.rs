//! Render target management
//!
//! A framebuffer plus the textures and renderbuffer attached to it, following
//! RAII: dropping the target queues every handle for release. Targets are
//! never resized in place; a size change means dropping the old target and
//! creating a new one.

use crate::render::api::{
    Extent2D, FramebufferDesc, FramebufferHandle, FramebufferStatus, GpuDevice, GpuResource,
    ReleaseQueue, RenderbufferDesc, RenderbufferFormat, RenderbufferHandle, TextureDesc, TextureFormat,
    TextureHandle,
};
use crate::render::{RenderError, RenderResult};

/// Largest width or height a target may have
pub const MAX_TARGET_DIMENSION: u32 = 16384;

/// What a target consists of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetDesc {
    /// Name used in logs
    pub label: &'static str,
    /// Size of every attachment
    pub extent: Extent2D,
    /// Colour attachment formats, in draw-buffer order
    pub color_formats: Vec<TextureFormat>,
    /// Attach a depth/stencil renderbuffer
    pub depth_stencil: bool,
}

impl RenderTargetDesc {
    /// Geometry buffer: position, normal, albedo+specular and depth/stencil
    pub fn gbuffer(extent: Extent2D) -> Self {
        Self {
            label: "gbuffer",
            extent,
            color_formats: vec![TextureFormat::Rgba16F, TextureFormat::Rgba16F, TextureFormat::Rgba8],
            depth_stencil: true,
        }
    }

    /// Single colour attachment, no depth
    pub fn single(label: &'static str, extent: Extent2D, format: TextureFormat) -> Self {
        Self {
            label,
            extent,
            color_formats: vec![format],
            depth_stencil: false,
        }
    }
}

/// Framebuffer with owned attachments
#[derive(Debug)]
pub struct RenderTarget {
    label: &'static str,
    extent: Extent2D,
    framebuffer: FramebufferHandle,
    color: Vec<TextureHandle>,
    depth_stencil: Option<RenderbufferHandle>,
    status: FramebufferStatus,
    release: ReleaseQueue,
}

impl RenderTarget {
    /// Create the attachments and the framebuffer
    ///
    /// Incompleteness is logged and recorded in [`RenderTarget::status`];
    /// it does not fail creation. If creating any resource fails, the ones
    /// already created are queued for release.
    pub fn create(device: &mut dyn GpuDevice, desc: &RenderTargetDesc) -> RenderResult<Self> {
        let extent = desc.extent;
        if extent.width > MAX_TARGET_DIMENSION || extent.height > MAX_TARGET_DIMENSION {
            return Err(RenderError::InvalidResolution(format!(
                "{} target of {}x{} exceeds {MAX_TARGET_DIMENSION}",
                desc.label, extent.width, extent.height
            )));
        }

        let release = device.release_queue();
        let mut created = Vec::new();

        let result = Self::create_attachments(device, desc, &mut created);
        let (color, depth_stencil, framebuffer) = match result {
            Ok(parts) => parts,
            Err(err) => {
                release.extend(created.into_iter().rev());
                return Err(err);
            }
        };

        let mut target = Self {
            label: desc.label,
            extent,
            framebuffer,
            color,
            depth_stencil,
            status: FramebufferStatus::Complete,
            release,
        };

        target.status = device.framebuffer_status(framebuffer)?;
        if target.is_complete() {
            log::info!("Created {} target {}x{}", desc.label, extent.width, extent.height);
        } else {
            log::error!(
                "Framebuffer for {} target ({}x{}) is not complete: {:?}",
                desc.label,
                extent.width,
                extent.height,
                target.status
            );
        }

        Ok(target)
    }

    fn create_attachments(
        device: &mut dyn GpuDevice,
        desc: &RenderTargetDesc,
        created: &mut Vec<GpuResource>,
    ) -> RenderResult<(Vec<TextureHandle>, Option<RenderbufferHandle>, FramebufferHandle)> {
        let mut color = Vec::with_capacity(desc.color_formats.len());
        for &format in &desc.color_formats {
            let texture = device.create_texture(&TextureDesc::attachment(desc.extent, format), None)?;
            created.push(GpuResource::Texture(texture));
            color.push(texture);
        }

        let depth_stencil = if desc.depth_stencil {
            let rbo = device.create_renderbuffer(&RenderbufferDesc {
                extent: desc.extent,
                format: RenderbufferFormat::Depth24Stencil8,
            })?;
            created.push(GpuResource::Renderbuffer(rbo));
            Some(rbo)
        } else {
            None
        };

        let framebuffer = device.create_framebuffer(&FramebufferDesc {
            color_attachments: color.clone(),
            depth_stencil,
        })?;

        Ok((color, depth_stencil, framebuffer))
    }

    /// Name used in logs
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Size of the attachments
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Framebuffer handle
    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    /// Colour attachment `index`
    pub fn color(&self, index: usize) -> RenderResult<TextureHandle> {
        self.color.get(index).copied().ok_or_else(|| {
            RenderError::InvalidHandle(format!("{} target has no colour attachment {index}", self.label))
        })
    }

    /// All colour attachments
    pub fn color_attachments(&self) -> &[TextureHandle] {
        &self.color
    }

    /// Depth/stencil renderbuffer, if any
    pub fn depth_stencil(&self) -> Option<RenderbufferHandle> {
        self.depth_stencil
    }

    /// Completeness recorded at creation
    pub fn status(&self) -> FramebufferStatus {
        self.status
    }

    /// True when the framebuffer was complete at creation
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Every handle owned by this target, framebuffer first
    pub fn resources(&self) -> Vec<GpuResource> {
        std::iter::once(GpuResource::Framebuffer(self.framebuffer))
            .chain(self.color.iter().map(|&t| GpuResource::Texture(t)))
            .chain(self.depth_stencil.map(GpuResource::Renderbuffer))
            .collect()
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        log::debug!("Releasing {} target {}x{}", self.label, self.extent.width, self.extent.height);
        self.release.extend(self.resources());
    }
}
