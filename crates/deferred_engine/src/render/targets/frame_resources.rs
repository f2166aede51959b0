//! Frame resource manager
//!
//! Owns the geometry buffer, the SSAO and SSAO-blur targets and the HDR
//! target. Size inputs are compared against the live targets, and a target
//! whose size changed is destroyed and then created again at the next
//! [`FrameResources::reconcile`]. The HDR target follows the surface; the
//! other three follow the configured resolutions and their dirty bits.

use bitflags::bitflags;

use crate::render::api::{Extent2D, GpuDevice, TextureFormat};
use crate::render::targets::render_target::{RenderTarget, RenderTargetDesc};
use crate::render::{RenderError, RenderResult};

bitflags! {
    /// Targets waiting to be rebuilt
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TargetDirty: u8 {
        /// Geometry buffer
        const GBUFFER = 1 << 0;
        /// Raw SSAO target
        const SSAO = 1 << 1;
        /// Blurred SSAO target
        const SSAO_BLUR = 1 << 2;
    }
}

/// The pipeline's render targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Position, normal, albedo+specular and depth/stencil
    GBuffer,
    /// Raw occlusion
    Ssao,
    /// Blurred occlusion
    SsaoBlur,
    /// HDR lighting output
    Hdr,
}

impl TargetKind {
    /// All kinds in rebuild order
    pub const ALL: [TargetKind; 4] = [TargetKind::Hdr, TargetKind::GBuffer, TargetKind::Ssao, TargetKind::SsaoBlur];

    const fn dirty_bit(self) -> TargetDirty {
        match self {
            Self::GBuffer => TargetDirty::GBUFFER,
            Self::Ssao => TargetDirty::SSAO,
            Self::SsaoBlur => TargetDirty::SSAO_BLUR,
            Self::Hdr => TargetDirty::empty(),
        }
    }
}

/// What a reconcile did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Targets destroyed and recreated, in rebuild order
    pub recreated: Vec<TargetKind>,
    /// Recreated targets whose framebuffer is incomplete
    pub incomplete: Vec<TargetKind>,
}

impl ReconcileReport {
    /// True when nothing was rebuilt
    pub fn is_noop(&self) -> bool {
        self.recreated.is_empty()
    }
}

/// Owner of the per-frame render targets
#[derive(Debug)]
pub struct FrameResources {
    gbuffer: Option<RenderTarget>,
    ssao: Option<RenderTarget>,
    ssao_blur: Option<RenderTarget>,
    hdr: Option<RenderTarget>,
    gbuffer_extent: Extent2D,
    ssao_extent: Extent2D,
    dirty: TargetDirty,
    recreations: u64,
}

impl FrameResources {
    /// Create every target; HDR takes the device's surface extent
    pub fn create(device: &mut dyn GpuDevice, gbuffer_extent: Extent2D, ssao_extent: Extent2D) -> RenderResult<Self> {
        let mut resources = Self {
            gbuffer: None,
            ssao: None,
            ssao_blur: None,
            hdr: None,
            gbuffer_extent,
            ssao_extent,
            dirty: TargetDirty::empty(),
            recreations: 0,
        };

        let surface = device.surface_extent();
        for kind in TargetKind::ALL {
            let target = RenderTarget::create(device, &resources.desc(kind, surface))?;
            *resources.slot_mut(kind) = Some(target);
        }
        Ok(resources)
    }

    fn desc(&self, kind: TargetKind, surface: Extent2D) -> RenderTargetDesc {
        match kind {
            TargetKind::GBuffer => RenderTargetDesc::gbuffer(self.gbuffer_extent),
            TargetKind::Ssao => RenderTargetDesc::single("ssao", self.ssao_extent, TextureFormat::R16F),
            TargetKind::SsaoBlur => RenderTargetDesc::single("ssao_blur", self.ssao_extent, TextureFormat::R16F),
            TargetKind::Hdr => RenderTargetDesc::single("hdr", surface, TextureFormat::Rgba16F),
        }
    }

    fn slot(&self, kind: TargetKind) -> &Option<RenderTarget> {
        match kind {
            TargetKind::GBuffer => &self.gbuffer,
            TargetKind::Ssao => &self.ssao,
            TargetKind::SsaoBlur => &self.ssao_blur,
            TargetKind::Hdr => &self.hdr,
        }
    }

    fn slot_mut(&mut self, kind: TargetKind) -> &mut Option<RenderTarget> {
        match kind {
            TargetKind::GBuffer => &mut self.gbuffer,
            TargetKind::Ssao => &mut self.ssao,
            TargetKind::SsaoBlur => &mut self.ssao_blur,
            TargetKind::Hdr => &mut self.hdr,
        }
    }

    /// Change the gbuffer size; marks it dirty only if the size differs
    pub fn set_gbuffer_extent(&mut self, extent: Extent2D) -> bool {
        if extent == self.gbuffer_extent {
            return false;
        }
        self.gbuffer_extent = extent;
        self.dirty |= TargetDirty::GBUFFER;
        true
    }

    /// Change the SSAO size; marks both SSAO targets dirty only if the size differs
    pub fn set_ssao_extent(&mut self, extent: Extent2D) -> bool {
        if extent == self.ssao_extent {
            return false;
        }
        self.ssao_extent = extent;
        self.dirty |= TargetDirty::SSAO | TargetDirty::SSAO_BLUR;
        true
    }

    /// Force targets to be rebuilt at the next reconcile
    pub fn mark_dirty(&mut self, flags: TargetDirty) {
        self.dirty |= flags;
    }

    /// Targets waiting to be rebuilt
    pub fn dirty(&self) -> TargetDirty {
        self.dirty
    }

    /// Configured gbuffer size
    pub fn gbuffer_extent(&self) -> Extent2D {
        self.gbuffer_extent
    }

    /// Configured SSAO size
    pub fn ssao_extent(&self) -> Extent2D {
        self.ssao_extent
    }

    /// Rebuild targets whose size inputs changed
    ///
    /// The HDR target is rebuilt when the surface extent differs from its
    /// own; the others when their dirty bit is set. Each rebuild releases
    /// and destroys the old resources before creating the new ones. A
    /// second call with nothing changed does no work.
    pub fn reconcile(&mut self, device: &mut dyn GpuDevice) -> RenderResult<ReconcileReport> {
        let surface = device.surface_extent();
        let mut report = ReconcileReport::default();

        for kind in TargetKind::ALL {
            let stale = match kind {
                TargetKind::Hdr => self.hdr.as_ref().map_or(true, |hdr| hdr.extent() != surface),
                _ => self.dirty.contains(kind.dirty_bit()) || self.slot(kind).is_none(),
            };
            if !stale {
                continue;
            }

            drop(self.slot_mut(kind).take());
            device.collect_released();

            let target = RenderTarget::create(device, &self.desc(kind, surface))?;
            if !target.is_complete() {
                report.incomplete.push(kind);
            }
            *self.slot_mut(kind) = Some(target);
            self.dirty.remove(kind.dirty_bit());
            self.recreations += 1;
            report.recreated.push(kind);
        }

        if !report.is_noop() {
            log::debug!("Reconciled frame resources: recreated {:?}", report.recreated);
        }
        Ok(report)
    }

    /// A live target
    pub fn target(&self, kind: TargetKind) -> RenderResult<&RenderTarget> {
        self.slot(kind)
            .as_ref()
            .ok_or_else(|| RenderError::ResourceCreationFailed(format!("{kind:?} target is missing")))
    }

    /// Geometry buffer
    pub fn gbuffer(&self) -> RenderResult<&RenderTarget> {
        self.target(TargetKind::GBuffer)
    }

    /// Raw SSAO target
    pub fn ssao(&self) -> RenderResult<&RenderTarget> {
        self.target(TargetKind::Ssao)
    }

    /// Blurred SSAO target
    pub fn ssao_blur(&self) -> RenderResult<&RenderTarget> {
        self.target(TargetKind::SsaoBlur)
    }

    /// HDR target
    pub fn hdr(&self) -> RenderResult<&RenderTarget> {
        self.target(TargetKind::Hdr)
    }

    /// Total number of target rebuilds since creation
    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    /// Live targets whose framebuffer is incomplete
    pub fn incomplete_targets(&self) -> Vec<TargetKind> {
        TargetKind::ALL
            .into_iter()
            .filter(|&kind| self.slot(kind).as_ref().is_some_and(|t| !t.is_complete()))
            .collect()
    }
}
