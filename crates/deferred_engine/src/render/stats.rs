//! Per-frame renderer statistics

use std::fmt;

/// Counters collected while rendering one frame
///
/// Non-fatal conditions (incomplete framebuffers, full clusters) show up
/// here rather than as errors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    /// Frustum cull time in milliseconds
    pub cull_ms: f64,
    /// Lights that survived the frustum cull
    pub visible_lights: usize,
    /// Lights in the scene
    pub total_lights: usize,
    /// Whether the cluster bounds were rebuilt
    pub bounds_rebuilt: bool,
    /// Lights dropped by full clusters; only filled when read back
    pub cluster_overflows: u32,
    /// Render targets recreated by `pre_render_checks`
    pub targets_recreated: usize,
    /// Render targets whose framebuffer is currently incomplete
    pub incomplete_framebuffers: usize,
}

impl FrameStats {
    /// Fraction of the scene's lights that were visible
    pub fn visible_ratio(&self) -> f32 {
        if self.total_lights == 0 {
            0.0
        } else {
            self.visible_lights as f32 / self.total_lights as f32
        }
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cull {:.3} ms, {}/{} lights visible, bounds {}, {} overflowed, {} targets rebuilt, {} incomplete",
            self.cull_ms,
            self.visible_lights,
            self.total_lights,
            if self.bounds_rebuilt { "rebuilt" } else { "cached" },
            self.cluster_overflows,
            self.targets_recreated,
            self.incomplete_framebuffers
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_ratio_handles_empty_scene() {
        assert_eq!(FrameStats::default().visible_ratio(), 0.0);
        let stats = FrameStats { visible_lights: 256, total_lights: 1024, ..Default::default() };
        assert_eq!(stats.visible_ratio(), 0.25);
    }

    #[test]
    fn test_display_mentions_light_counts() {
        let stats = FrameStats { visible_lights: 3, total_lights: 10, ..Default::default() };
        assert!(stats.to_string().contains("3/10 lights visible"));
    }
}
