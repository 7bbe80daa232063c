/// Per-stage settings consumed by the update context.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    /// Screen pixels per scene unit, used to turn edge softness (in pixels)
    /// into a clip-space falloff factor.
    pub pixels_per_unit: f32,
    /// Maximum number of nested stencil masks. Each level claims one bit of
    /// the 32-bit stencil reference value, so this is clamped to 1..=32.
    pub max_stencil_depth: u32,
    /// Falloff factor written for edges that have no softness.
    pub soft_clip_hard_edge: f32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            pixels_per_unit: 1.0,
            max_stencil_depth: u32::BITS,
            soft_clip_hard_edge: 10000.0,
        }
    }
}

impl StageConfig {
    pub fn with_pixels_per_unit(mut self, pixels_per_unit: f32) -> Self {
        self.pixels_per_unit = pixels_per_unit;
        self
    }

    pub fn with_max_stencil_depth(mut self, depth: u32) -> Self {
        self.max_stencil_depth = depth.clamp(1, u32::BITS);
        self
    }

    pub fn with_soft_clip_hard_edge(mut self, factor: f32) -> Self {
        self.soft_clip_hard_edge = factor;
        self
    }

    /// The stencil depth bound actually enforced.
    pub fn stencil_depth_limit(&self) -> u32 {
        self.max_stencil_depth.clamp(1, u32::BITS)
    }
}
