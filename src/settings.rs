use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SimError};
use crate::io::serial::Parity;

/// Simulator settings. Every key is optional in the TOML file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimSettings {
    /// Wait between two replayed units until `setInterval` changes it (ms)
    pub interval_ms: u64,
    /// Multiplier applied to the `setInterval` argument
    pub interval_scale: u64,
    /// Pause between a baud change and the replay restart (ms)
    pub settle_ms: u64,
    /// Start replaying without waiting for `on`
    pub start_on_launch: bool,
    /// Serial read timeout used by the command listener (ms)
    pub read_timeout_ms: u64,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Directory for timestamped log files (stderr only when unset)
    pub log_dir: Option<PathBuf>,
}

impl Default for SimSettings {
    fn default() -> Self {
        SimSettings {
            interval_ms: 300,
            interval_scale: 100,
            settle_ms: 1000,
            start_on_launch: false,
            read_timeout_ms: 50,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            log_dir: None,
        }
    }
}

impl SimSettings {
    /// Parse settings from TOML text and reject values the engine cannot run with.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: SimSettings = toml::from_str(content)
            .map_err(|e| SimError::Config(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit path, or from the default location.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_settings_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(SimSettings::default()),
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            SimError::Config(format!("Failed to read settings {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SimError::Config("interval_ms must be positive".to_string()));
        }
        if self.interval_scale == 0 {
            return Err(SimError::Config("interval_scale must be positive".to_string()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(SimError::Config(format!(
                "data_bits must be 5-8, got {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(SimError::Config(format!(
                "stop_bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        Ok(())
    }
}

/// `<config dir>/serialsim/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("serialsim").join("settings.toml"))
}
