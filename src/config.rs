//! Player configuration (JSON)

use crate::replayer::timing::TimingConfig;
use crate::replayer::SessionOptions;
use crate::{Result, YmSerialError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete player configuration
///
/// Every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Serial device node; `None` means dry run
    pub device: Option<PathBuf>,
    /// Frame pump wait policy
    pub timing: TimingConfig,
    /// Playback behaviour
    pub session: SessionOptions,
}

impl PlayerConfig {
    /// Parse a JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(text)
            .map_err(|e| YmSerialError::ConfigError(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            YmSerialError::ConfigError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| YmSerialError::Other(e.to_string()))
    }

    /// Reject settings the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.timing.sleep_granularity_us == 0 {
            return Err(YmSerialError::ConfigError(
                "timing.sleep_granularity_us must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
