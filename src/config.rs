//! Stream and buffer configuration
//!
//! Configuration is fixed at construction time: a [`StreamConfig`] is handed
//! to the orchestrator once and never mutated afterwards, and every channel
//! carries its own [`BufferConfig`] whose capacities must match across all
//! channels registered with one orchestrator.
//!
//! Both types derive serde and can round-trip through TOML files via
//! [`StreamConfig::load_from_file`] / [`StreamConfig::save_to_file`], so a
//! host application can keep its acquisition settings next to the rest of its
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DataStreamError, Result};

/// Configuration for the streaming orchestrator
///
/// All fields are read once at construction; changing a loaded config after
/// the orchestrator has been created has no effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Minimum spacing between sampling ticks. Sampling is at-least-interval
    /// spaced, not exactly periodic.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Timestamp column semantics: `true` renders absolute epoch-relative
    /// seconds, `false` renders seconds elapsed since `start_streaming`.
    #[serde(default)]
    pub use_absolute_timestamp: bool,

    /// Optional prefix for recording filenames
    /// (`<prepend>-datastream-<date>-<time>.csv`).
    #[serde(default)]
    pub record_prepend: Option<String>,

    /// Directory recordings are created in. Defaults to the process's
    /// working directory.
    #[serde(default)]
    pub record_dir: Option<PathBuf>,
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(10)
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            use_absolute_timestamp: false,
            record_prepend: None,
            record_dir: None,
        }
    }
}

impl StreamConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(DataStreamError::InvalidConfiguration(
                "tick_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a stream configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataStreamError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            DataStreamError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save the stream configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| DataStreamError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            DataStreamError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

/// Buffer sizing for one channel
///
/// Every channel registered with one orchestrator must carry the same two
/// capacities; the orchestrator rejects mismatches at registration because
/// unequal buffers would break cross-channel row alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum number of pending samples in the raw intake queue. A sample
    /// arriving at a full queue discards the whole queue first
    /// (drop-and-reset).
    #[serde(default = "default_raw_capacity")]
    pub raw_capacity: usize,

    /// Exact capacity of the processed-history ring; pushing past it evicts
    /// the oldest entry.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_raw_capacity() -> usize {
    256
}

fn default_history_capacity() -> usize {
    100_000
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            raw_capacity: default_raw_capacity(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl BufferConfig {
    /// Create a buffer configuration with explicit capacities
    pub fn new(raw_capacity: usize, history_capacity: usize) -> Self {
        Self {
            raw_capacity,
            history_capacity,
        }
    }

    /// Validate the capacities
    pub fn validate(&self) -> Result<()> {
        if self.raw_capacity == 0 {
            return Err(DataStreamError::InvalidConfiguration(
                "raw_capacity must be positive".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(DataStreamError::InvalidConfiguration(
                "history_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert!(!config.use_absolute_timestamp);
        assert!(config.record_prepend.is_none());
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let config = StreamConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DataStreamError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_buffer_config_rejects_zero_capacities() {
        assert!(BufferConfig::new(0, 8).validate().is_err());
        assert!(BufferConfig::new(4, 0).validate().is_err());
        assert!(BufferConfig::new(4, 8).validate().is_ok());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stream.toml");

        let config = StreamConfig {
            tick_interval: Duration::from_millis(5),
            use_absolute_timestamp: true,
            record_prepend: Some("bench".to_string()),
            record_dir: None,
        };
        config.save_to_file(&path).expect("save");

        let loaded = StreamConfig::load_from_file(&path).expect("load");
        assert_eq!(loaded.tick_interval, Duration::from_millis(5));
        assert!(loaded.use_absolute_timestamp);
        assert_eq!(loaded.record_prepend.as_deref(), Some("bench"));
    }

    #[test]
    fn test_load_rejects_invalid_file_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[tick_interval]\nsecs = 0\nnanos = 0\n").expect("write");

        let err = StreamConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, DataStreamError::InvalidConfiguration(_)));
    }
}
