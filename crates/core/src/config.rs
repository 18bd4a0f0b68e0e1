use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Engine settings read from TOML. Missing keys fall back to defaults,
/// unknown keys are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on creature worker threads per turn.
    pub max_ai_threads: usize,
    pub turns_per_second: f64,
    /// Turns between two workers produced by a dungeon temple.
    pub temple_spawn_turns: u32,
    /// Free deleted creatures during the deletion flush once no render lock
    /// holds their turn.
    pub reclaim_on_flush: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ai_threads: thread::available_parallelism().map_or(4, NonZeroUsize::get),
            turns_per_second: 1.4,
            temple_spawn_turns: 30,
            reclaim_on_flush: true,
            log_filter: "info".to_owned(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ai_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "max_ai_threads",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !self.turns_per_second.is_finite() || self.turns_per_second <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "turns_per_second",
                reason: format!("must be a positive number, got {}", self.turns_per_second),
            });
        }
        if self.temple_spawn_turns == 0 {
            return Err(ConfigError::Invalid {
                field: "temple_spawn_turns",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Seconds of game time covered by one turn.
    pub fn frame_time(&self) -> f64 {
        1.0 / self.turns_per_second
    }
}
