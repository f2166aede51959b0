//! Shader programs used by the pipeline
//!
//! Every program the renderer builds is named by a [`ProgramKind`], which
//! knows its source files, the storage buffers it touches and the sampler
//! units its texture uniforms are wired to.

use std::collections::HashMap;

use crate::core::config::ShaderConfig;
use crate::render::api::{
    GpuDevice, GpuResource, ProgramDesc, ProgramHandle, ReleaseQueue, ShaderSource, ShaderStage,
    StorageAccess, StorageUsage, UniformValue,
};
use crate::render::lighting::{CLUSTER_BINDING, CLUSTER_STATS_BINDING, LIGHT_BINDING};
use crate::render::{RenderError, RenderResult};

/// Fullscreen vertex shader shared by all screen-space passes
pub const SCREENSPACE_VERTEX: &str = "simple_screenspace.vert";

/// Programs built by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Fills the geometry buffer
    GeometryPass,
    /// Resolves clustered lighting from the geometry buffer
    LightingPass,
    /// Raw ambient occlusion
    Ssao,
    /// Blur of the raw occlusion
    SsaoBlur,
    /// HDR resolve to the backbuffer
    ToneMap,
    /// Cluster AABB compute kernel
    ClusterBounds,
    /// Cluster light assignment compute kernel
    ClusterLightCull,
    /// Instanced constant-colour light markers
    DebugMarkers,
}

impl ProgramKind {
    /// Every kind, in creation order
    pub const ALL: [ProgramKind; 8] = [
        ProgramKind::GeometryPass,
        ProgramKind::LightingPass,
        ProgramKind::Ssao,
        ProgramKind::SsaoBlur,
        ProgramKind::ToneMap,
        ProgramKind::ClusterBounds,
        ProgramKind::ClusterLightCull,
        ProgramKind::DebugMarkers,
    ];

    /// Screen-space and geometry programs owned by the pipeline
    pub const PASSES: [ProgramKind; 5] = [
        ProgramKind::GeometryPass,
        ProgramKind::LightingPass,
        ProgramKind::Ssao,
        ProgramKind::SsaoBlur,
        ProgramKind::ToneMap,
    ];

    /// Debug label
    pub const fn label(self) -> &'static str {
        match self {
            Self::GeometryPass => "gbuffer_geometry",
            Self::LightingPass => "gbuffer_lighting",
            Self::Ssao => "ssao",
            Self::SsaoBlur => "ssao_blur",
            Self::ToneMap => "hdr_tonemap",
            Self::ClusterBounds => "cluster_bounds",
            Self::ClusterLightCull => "cluster_light_cull",
            Self::DebugMarkers => "debug_markers",
        }
    }

    /// Source file names per stage
    pub const fn sources(self) -> &'static [(ShaderStage, &'static str)] {
        match self {
            Self::GeometryPass => &[
                (ShaderStage::Vertex, "gbuffer_geo_pass.vert"),
                (ShaderStage::Fragment, "gbuffer_geo_pass.frag"),
            ],
            Self::LightingPass => &[
                (ShaderStage::Vertex, SCREENSPACE_VERTEX),
                (ShaderStage::Fragment, "gbuffer_light_pass.frag"),
            ],
            Self::Ssao => &[
                (ShaderStage::Vertex, SCREENSPACE_VERTEX),
                (ShaderStage::Fragment, "ssao.frag"),
            ],
            Self::SsaoBlur => &[
                (ShaderStage::Vertex, SCREENSPACE_VERTEX),
                (ShaderStage::Fragment, "ssao_blur.frag"),
            ],
            Self::ToneMap => &[
                (ShaderStage::Vertex, SCREENSPACE_VERTEX),
                (ShaderStage::Fragment, "hdr.frag"),
            ],
            Self::ClusterBounds => &[(ShaderStage::Compute, "cluster_bounds.comp")],
            Self::ClusterLightCull => &[(ShaderStage::Compute, "cluster_light_cull.comp")],
            Self::DebugMarkers => &[
                (ShaderStage::Vertex, "constant_instanced.vert"),
                (ShaderStage::Fragment, "constant.frag"),
            ],
        }
    }

    /// Storage buffers the program reads or writes
    pub fn storage(self) -> Vec<StorageUsage> {
        let usage = |binding, access| StorageUsage { binding, access };
        match self {
            Self::LightingPass => vec![
                usage(CLUSTER_BINDING, StorageAccess::Read),
                usage(LIGHT_BINDING, StorageAccess::Read),
            ],
            Self::ClusterBounds => vec![usage(CLUSTER_BINDING, StorageAccess::Write)],
            Self::ClusterLightCull => vec![
                usage(CLUSTER_BINDING, StorageAccess::ReadWrite),
                usage(LIGHT_BINDING, StorageAccess::Read),
                usage(CLUSTER_STATS_BINDING, StorageAccess::ReadWrite),
            ],
            Self::DebugMarkers => vec![usage(LIGHT_BINDING, StorageAccess::Read)],
            Self::GeometryPass | Self::Ssao | Self::SsaoBlur | Self::ToneMap => Vec::new(),
        }
    }

    /// Sampler uniforms and the texture unit each reads from
    pub const fn sampler_units(self) -> &'static [(&'static str, i32)] {
        match self {
            Self::LightingPass => &[("gPosition", 0), ("gNormal", 1), ("gAlbedoSpec", 2), ("ssao", 3)],
            Self::Ssao => &[("gPosition", 0), ("gNormal", 1), ("texNoise", 2)],
            Self::SsaoBlur => &[("ssaoInput", 0)],
            Self::ToneMap => &[("hdrBuffer", 0)],
            Self::GeometryPass | Self::ClusterBounds | Self::ClusterLightCull | Self::DebugMarkers => &[],
        }
    }

    /// Full program description with paths resolved against `shaders`
    pub fn desc(self, shaders: &ShaderConfig) -> ProgramDesc {
        ProgramDesc {
            label: self.label().to_string(),
            stages: self
                .sources()
                .iter()
                .map(|&(stage, file)| ShaderSource { stage, path: shaders.path_of(file) })
                .collect(),
            storage: self.storage(),
        }
    }
}

/// A set of linked programs, released together
#[derive(Debug)]
pub struct PassPrograms {
    programs: HashMap<ProgramKind, ProgramHandle>,
    release: ReleaseQueue,
}

impl PassPrograms {
    /// Build `kinds` and assign their sampler units
    pub fn load(device: &mut dyn GpuDevice, shaders: &ShaderConfig, kinds: &[ProgramKind]) -> RenderResult<Self> {
        let mut programs = Self {
            programs: HashMap::with_capacity(kinds.len()),
            release: device.release_queue(),
        };

        for &kind in kinds {
            let handle = device.create_program(&kind.desc(shaders)).map_err(|e| {
                RenderError::InitializationFailed(format!("failed to build {} program: {e}", kind.label()))
            })?;
            programs.programs.insert(kind, handle);

            for &(name, unit) in kind.sampler_units() {
                device.set_uniform(handle, name, UniformValue::Int(unit))?;
            }
            log::debug!("Built {} program", kind.label());
        }

        Ok(programs)
    }

    /// Handle of a loaded program
    pub fn get(&self, kind: ProgramKind) -> RenderResult<ProgramHandle> {
        self.programs
            .get(&kind)
            .copied()
            .ok_or_else(|| RenderError::InvalidHandle(format!("{} program was not loaded", kind.label())))
    }

    /// Number of loaded programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// True when no program is loaded
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Drop for PassPrograms {
    fn drop(&mut self) {
        self.release
            .extend(self.programs.drain().map(|(_, handle)| GpuResource::Program(handle)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shader_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../resources/shaders")
    }

    #[test]
    fn test_every_shader_source_exists() {
        let shaders = ShaderConfig::new(shader_dir());
        for kind in ProgramKind::ALL {
            for source in kind.desc(&shaders).stages {
                assert!(source.path.is_file(), "missing shader source {}", source.path.display());
            }
        }
    }

    #[test]
    fn test_compute_kinds_have_single_compute_stage() {
        let shaders = ShaderConfig::new(shader_dir());
        for kind in [ProgramKind::ClusterBounds, ProgramKind::ClusterLightCull] {
            let desc = kind.desc(&shaders);
            assert!(desc.is_compute());
            assert_eq!(desc.stages.len(), 1);
        }
        assert!(!ProgramKind::LightingPass.desc(&shaders).is_compute());
    }

    #[test]
    fn test_lighting_sampler_units() {
        assert_eq!(
            ProgramKind::LightingPass.sampler_units(),
            &[("gPosition", 0), ("gNormal", 1), ("gAlbedoSpec", 2), ("ssao", 3)]
        );
        assert_eq!(ProgramKind::ToneMap.sampler_units(), &[("hdrBuffer", 0)]);
    }
}
