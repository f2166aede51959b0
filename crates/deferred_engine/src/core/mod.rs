//! Core engine configuration
//!
//! Consolidates the configuration structures that drive the renderer. Values
//! are threaded explicitly into the pipeline; nothing here is global.

pub mod config;

pub use config::{
    ApplicationConfig, ClusterRebuild, ClusterSettings, QualityPreset, RenderConfig, Resolution,
    ShaderConfig, SsaoSettings, ToneMapSettings,
};
