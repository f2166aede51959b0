//! # Renderer Configuration
//!
//! Every tunable of the deferred pipeline lives in [`RenderConfig`]: SSAO
//! parameters, render-target resolutions, tone mapping, debug fill modes and
//! the light cluster grid. A [`QualityPreset`] produces a complete config in
//! one step; individual values stay mutable afterwards through the pipeline's
//! setters, which flip the matching dirty bits.
//!
//! ## Configuration Categories
//!
//! - **SSAO**: enable flag, kernel sample count, radius, bias, power
//! - **Resolutions**: gbuffer and SSAO backing sizes, picked from [`Resolution`]
//! - **Tone mapping**: exposure and gamma for the HDR resolve
//! - **Clusters**: grid dimensions and the bounds rebuild policy
//! - **Shaders**: where the GLSL sources for each pass live

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{Config, ConfigError};
use crate::render::api::Extent2D;

/// Default SSAO sampling radius shared by both presets
pub const DEFAULT_SSAO_RADIUS: f32 = 1.45;
/// Default depth bias shared by both presets
pub const DEFAULT_SSAO_BIAS: f32 = 0.055;
/// Default occlusion power shared by both presets
pub const DEFAULT_SSAO_POWER: f32 = 2.5;
/// Default kernel sample count shared by both presets
pub const DEFAULT_SSAO_SAMPLES: i32 = 48;

/// Smallest sample count the SSAO shader is tuned for
pub const MIN_SSAO_SAMPLES: i32 = 4;
/// Largest sample count; matches the size of the generated kernel
pub const MAX_SSAO_SAMPLES: i32 = 64;

/// Fixed render-target resolutions offered to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// 3840x2160
    Uhd4K,
    /// 2560x1600
    Retina,
    /// 1920x1080
    FullHd,
    /// 1280x720
    Hd,
    /// 960x540, half of 1080p
    HalfFullHd,
    /// 640x360
    Nhd,
}

impl Resolution {
    /// All resolutions, largest first; index order matches [`TryFrom<usize>`]
    pub const ALL: [Resolution; 6] = [
        Resolution::Uhd4K,
        Resolution::Retina,
        Resolution::FullHd,
        Resolution::Hd,
        Resolution::HalfFullHd,
        Resolution::Nhd,
    ];

    /// Pixel dimensions
    pub const fn extent(self) -> Extent2D {
        match self {
            Self::Uhd4K => Extent2D::new(3840, 2160),
            Self::Retina => Extent2D::new(2560, 1600),
            Self::FullHd => Extent2D::new(1920, 1080),
            Self::Hd => Extent2D::new(1280, 720),
            Self::HalfFullHd => Extent2D::new(960, 540),
            Self::Nhd => Extent2D::new(640, 360),
        }
    }

    /// Human-readable label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uhd4K => "3840x2160 (4K)",
            Self::Retina => "2560x1600 (retina)",
            Self::FullHd => "1920x1080",
            Self::Hd => "1280x720",
            Self::HalfFullHd => "960x540 (half 1080p)",
            Self::Nhd => "640x360",
        }
    }

    /// Position in [`Resolution::ALL`]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|r| *r == self).unwrap_or_default()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<usize> for Resolution {
    type Error = ConfigError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "resolution index {index} is out of range (0..{})",
                Self::ALL.len()
            ))
        })
    }
}

/// Graphics quality preset selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityPreset {
    /// SSAO disabled, 960x540 SSAO target
    #[default]
    Low,
    /// SSAO enabled, 1280x720 SSAO target
    High,
}

impl QualityPreset {
    /// Preset name as accepted on the command line
    pub const fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl FromStr for QualityPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(ConfigError::Invalid(format!(
                "unknown quality preset '{other}', expected one of: low, high"
            ))),
        }
    }
}

/// Screen-space ambient occlusion parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SsaoSettings {
    /// Whether the SSAO passes run at all
    pub enabled: bool,
    /// Number of kernel samples used per pixel
    pub samples: i32,
    /// Sampling hemisphere radius in view-space units
    pub radius: f32,
    /// Depth bias against self-occlusion
    pub bias: f32,
    /// Exponent applied to the occlusion term
    pub power: f32,
}

impl SsaoSettings {
    /// Clamp the sample count into the range the kernel supports
    ///
    /// The renderer passes samples through untouched; this is for UIs and
    /// config loaders that want to sanitize user input.
    pub fn clamp_samples(&mut self) {
        self.samples = self.samples.clamp(MIN_SSAO_SAMPLES, MAX_SSAO_SAMPLES);
    }
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: DEFAULT_SSAO_SAMPLES,
            radius: DEFAULT_SSAO_RADIUS,
            bias: DEFAULT_SSAO_BIAS,
            power: DEFAULT_SSAO_POWER,
        }
    }
}

/// HDR resolve parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneMapSettings {
    /// Exposure multiplier applied before tone mapping
    pub exposure: f32,
    /// Display gamma
    pub gamma: f32,
}

impl Default for ToneMapSettings {
    fn default() -> Self {
        Self { exposure: 1.0, gamma: 2.2 }
    }
}

/// When the per-cluster bounding boxes are recomputed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterRebuild {
    /// Dispatch the bounds kernel every frame
    EveryFrame,
    /// Dispatch only when near/far, projection or surface size change
    #[default]
    OnChange,
}

/// Light cluster grid settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Number of clusters along screen x, screen y and depth
    pub grid: [u32; 3],
    /// Bounds rebuild policy
    pub rebuild: ClusterRebuild,
}

impl ClusterSettings {
    /// Total number of clusters in the grid
    pub fn cluster_count(&self) -> usize {
        self.grid.iter().map(|&n| n as usize).product()
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            grid: [12, 12, 24],
            rebuild: ClusterRebuild::default(),
        }
    }
}

/// # Shader Configuration
///
/// Locates the GLSL sources each pass is built from. Backends that compile
/// shaders read files from here; the headless backend only checks names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Directory containing the shader sources
    pub directory: PathBuf,
}

impl ShaderConfig {
    /// Create a shader configuration rooted at `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the common locations relative to the working directory so the
    /// demo can be launched from the workspace root or from its own crate.
    pub fn with_path_resolution() -> Self {
        let shader_dirs = [
            "resources/shaders",
            "../resources/shaders",
            "../../resources/shaders",
        ];

        let directory = shader_dirs
            .iter()
            .map(Path::new)
            .find(|dir| dir.is_dir())
            .unwrap_or_else(|| Path::new(shader_dirs[0]));

        Self::new(directory)
    }

    /// Full path of a shader source file
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution()
    }
}

/// # Render Configuration
///
/// The complete set of values the deferred pipeline reads. Passed by value
/// into [`crate::render::passes::DeferredPipeline::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// SSAO parameters
    pub ssao: SsaoSettings,
    /// Backing resolution of the SSAO and SSAO blur targets
    pub ssao_resolution: Resolution,
    /// Resolution of the geometry buffer
    pub gbuffer_resolution: Resolution,
    /// HDR resolve parameters
    pub tonemap: ToneMapSettings,
    /// Rasterize the geometry pass as lines
    pub wireframe: bool,
    /// Enable back-face culling during the geometry pass
    pub cull_backfaces: bool,
    /// Light cluster grid
    pub clusters: ClusterSettings,
    /// Shader source locations
    pub shaders: ShaderConfig,
}

impl RenderConfig {
    /// Build the configuration for a quality preset
    pub fn from_preset(preset: QualityPreset) -> Self {
        let (enabled, ssao_resolution) = match preset {
            QualityPreset::High => (true, Resolution::Hd),
            QualityPreset::Low => (false, Resolution::HalfFullHd),
        };

        Self {
            ssao: SsaoSettings {
                enabled,
                ..SsaoSettings::default()
            },
            ssao_resolution,
            gbuffer_resolution: Resolution::FullHd,
            tonemap: ToneMapSettings::default(),
            wireframe: false,
            cull_backfaces: true,
            clusters: ClusterSettings::default(),
            shaders: ShaderConfig::default(),
        }
    }

    /// Set SSAO parameters
    pub fn with_ssao(mut self, ssao: SsaoSettings) -> Self {
        self.ssao = ssao;
        self
    }

    /// Set the SSAO backing resolution
    pub fn with_ssao_resolution(mut self, resolution: Resolution) -> Self {
        self.ssao_resolution = resolution;
        self
    }

    /// Set the geometry buffer resolution
    pub fn with_gbuffer_resolution(mut self, resolution: Resolution) -> Self {
        self.gbuffer_resolution = resolution;
        self
    }

    /// Set the cluster grid settings
    pub fn with_clusters(mut self, clusters: ClusterSettings) -> Self {
        self.clusters = clusters;
        self
    }

    /// Set the shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clusters.grid.contains(&0) {
            return Err(ConfigError::Invalid(format!(
                "cluster grid {:?} has a zero dimension",
                self.clusters.grid
            )));
        }

        if !(self.tonemap.gamma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tonemap gamma must be positive, got {}",
                self.tonemap.gamma
            )));
        }

        if !(MIN_SSAO_SAMPLES..=MAX_SSAO_SAMPLES).contains(&self.ssao.samples) {
            log::warn!(
                "SSAO sample count {} is outside [{MIN_SSAO_SAMPLES}, {MAX_SSAO_SAMPLES}]",
                self.ssao.samples
            );
        }

        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::from_preset(QualityPreset::default())
    }
}

impl Config for RenderConfig {}

/// # Complete Application Configuration
///
/// Top-level configuration for binaries built on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name used in logs
    pub application_name: String,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Initial surface size in pixels
    pub surface_size: (u32, u32),
    /// Number of point lights scattered into the scene
    pub light_count: usize,
    /// Renderer configuration
    pub render: RenderConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            log_level: "info".to_string(),
            surface_size: (1920, 1080),
            light_count: 1024,
            render: RenderConfig::default(),
        }
    }

    /// Replace the renderer configuration with a preset
    pub fn with_preset(mut self, preset: QualityPreset) -> Self {
        let shaders = self.render.shaders.clone();
        self.render = RenderConfig::from_preset(preset).with_shaders(shaders);
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }
        self.render.validate()
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("Clustered Deferred Demo")
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_preset_enables_ssao_at_720p() {
        let config = RenderConfig::from_preset(QualityPreset::High);
        assert!(config.ssao.enabled);
        assert_eq!(config.ssao.samples, 48);
        assert_eq!(config.ssao.radius, DEFAULT_SSAO_RADIUS);
        assert_eq!(config.ssao.bias, DEFAULT_SSAO_BIAS);
        assert_eq!(config.ssao.power, DEFAULT_SSAO_POWER);
        assert_eq!(config.ssao_resolution.extent(), Extent2D::new(1280, 720));
        assert_eq!(config.gbuffer_resolution.extent(), Extent2D::new(1920, 1080));
    }

    #[test]
    fn test_low_preset_disables_ssao_at_540p() {
        let config = RenderConfig::from_preset(QualityPreset::Low);
        assert!(!config.ssao.enabled);
        assert_eq!(config.ssao_resolution, Resolution::HalfFullHd);
        assert_eq!(config.gbuffer_resolution, Resolution::FullHd);
    }

    #[test]
    fn test_quality_preset_parsing() {
        assert_eq!("HIGH".parse::<QualityPreset>().unwrap(), QualityPreset::High);
        assert_eq!("low".parse::<QualityPreset>().unwrap(), QualityPreset::Low);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[test]
    fn test_resolution_index_conversion() {
        for (i, res) in Resolution::ALL.iter().enumerate() {
            assert_eq!(Resolution::try_from(i).unwrap(), *res);
            assert_eq!(res.index(), i);
        }
        assert!(Resolution::try_from(Resolution::ALL.len()).is_err());
        assert_eq!(Resolution::FullHd.label(), "1920x1080");
    }

    #[test]
    fn test_samples_are_clamped_only_on_request() {
        let mut ssao = SsaoSettings { samples: 200, ..SsaoSettings::default() };
        let config = RenderConfig::default().with_ssao(ssao);
        assert!(config.validate().is_ok());
        assert_eq!(config.ssao.samples, 200);

        ssao.clamp_samples();
        assert_eq!(ssao.samples, MAX_SSAO_SAMPLES);
        ssao.samples = 1;
        ssao.clamp_samples();
        assert_eq!(ssao.samples, MIN_SSAO_SAMPLES);
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let mut config = RenderConfig::default();
        config.clusters.grid = [12, 0, 24];
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.tonemap.gamma = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrips_through_toml_and_ron() {
        let dir = std::env::temp_dir().join(format!("deferred_engine_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = ApplicationConfig::default().with_preset(QualityPreset::High);
        for name in ["app.toml", "app.ron"] {
            let path = dir.join(name);
            config.save_to_file(&path).unwrap();
            let loaded = ApplicationConfig::load_from_file(&path).unwrap();
            assert_eq!(loaded, config);
        }

        let bad = dir.join("app.json");
        assert!(matches!(config.save_to_file(&bad), Err(ConfigError::UnsupportedFormat(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
