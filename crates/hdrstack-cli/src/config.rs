use std::path::Path;

use serde::Deserialize;

use hdrstack::{DEFAULT_GAMMA, DEFAULT_WINDOW_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Pipeline settings loaded from a TOML file. Command-line flags override
/// whatever the file provides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Number of frames stacked into one composite.
    pub window: usize,
    /// Gamma exponent for linearization.
    pub gamma: f32,
    /// RGBA color for stacked bands that have no frame yet.
    pub sentinel: [f32; 4],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW_SIZE,
            gamma: DEFAULT_GAMMA,
            sentinel: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
