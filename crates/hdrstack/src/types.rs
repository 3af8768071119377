use crate::error::StageError;

/// Upper bound on the compositor window size. Each slot becomes a texture
/// binding in the generated shader, so the bound keeps bind group layouts
/// within what every wgpu backend guarantees.
pub const MAX_WINDOW_SLOTS: usize = 8;

/// Gamma exponent that approximates the encoding of common LDR sources.
pub const DEFAULT_GAMMA: f32 = 2.2;

/// Window size used when the caller does not configure one.
pub const DEFAULT_WINDOW_SIZE: usize = 3;

/// Configuration for [`crate::ExposureLinearizer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearizerOptions {
    /// Exponent applied to each RGB channel before exposure normalization.
    pub gamma: f32,
}

impl Default for LinearizerOptions {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl LinearizerOptions {
    pub(crate) fn validate(&self) -> Result<(), StageError> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(StageError::InvalidInput(format!(
                "gamma must be a positive finite number, got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

/// Configuration for [`crate::ExposureStackCompositor`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositorOptions {
    /// Number of vertical bands in the stacked output texture.
    pub window_size: usize,
    /// RGBA color written to bands that have no buffered frame yet.
    pub sentinel: [f32; 4],
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            sentinel: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl CompositorOptions {
    pub(crate) fn validate(&self) -> Result<(), StageError> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SLOTS {
            return Err(StageError::InvalidInput(format!(
                "window size must be between 1 and {MAX_WINDOW_SLOTS}, got {}",
                self.window_size
            )));
        }
        Ok(())
    }
}
