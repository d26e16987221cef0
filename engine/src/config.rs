//! Settings file.
//!
//! ```toml
//! max_concurrent_jobs = 2
//! defer_post_process = false
//! pause_poll_interval_ms = 200
//!
//! [defaults]
//! checksum = "xxhash64"
//! verification = "full"
//! skip_existing = true
//! resume_partial = true
//! eject_on_success = false
//! ```
//!
//! Missing keys take their defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::JobControl;
use crate::error::{EngineError, Result};
use crate::model::TransferOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Jobs that may run at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Leave post-processing to an explicit request instead of running it
    /// after every successful copy job
    #[serde(default)]
    pub defer_post_process: bool,

    /// Sleep between pause-flag polls while a job is parked
    #[serde(default = "default_pause_poll_interval_ms")]
    pub pause_poll_interval_ms: u64,

    /// Options applied to newly built copy jobs
    #[serde(default)]
    pub defaults: TransferOptions,
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_pause_poll_interval_ms() -> u64 {
    200
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            defer_post_process: false,
            pause_poll_interval_ms: default_pause_poll_interval_ms(),
            defaults: TransferOptions::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a TOML file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        fs::write(path, contents).map_err(|e| EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(EngineError::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.pause_poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "pause_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    /// A fresh control handle using the configured poll interval.
    pub fn new_control(&self) -> JobControl {
        JobControl::with_poll_interval(self.pause_poll_interval())
    }
}
