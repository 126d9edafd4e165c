//! Pipeline configuration
//!
//! Loaded from an optional YAML file with `TRENDSTREAM_`-prefixed
//! environment overrides, then validated before the supervisor starts.
//! Defaults mirror the production deployment: 30-minute windows hopping
//! every 15 minutes, 15 minutes of allowed lateness, three partitions.

use chrono::Duration;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::sink::PublisherConfig;
use crate::stats::StatsMode;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Window geometry
    #[serde(default)]
    pub window: WindowConfig,

    /// Watermark / lateness settings
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Number of keyed partitions (independent workers)
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Capacity of each worker's input queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Checkpoint persistence settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Statistics variant (cumulative or last-K-windows)
    #[serde(default)]
    pub stats: StatsMode,

    /// Sink retry policy
    #[serde(default)]
    pub publisher: PublisherRetryConfig,

    /// Keyword subscription for the filtered counts view (exact match)
    #[serde(default)]
    pub subscribe: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            watermark: WatermarkConfig::default(),
            partitions: default_partitions(),
            channel_capacity: default_channel_capacity(),
            checkpoint: CheckpointConfig::default(),
            stats: StatsMode::default(),
            publisher: PublisherRetryConfig::default(),
            subscribe: None,
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("TRENDSTREAM_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.size_secs <= 0 {
            return Err(ConfigError::Validation(format!(
                "window.size_secs must be positive, got {}",
                self.window.size_secs
            )));
        }
        if self.window.hop_secs <= 0 || self.window.hop_secs > self.window.size_secs {
            return Err(ConfigError::Validation(format!(
                "window.hop_secs must be in 1..={}, got {}",
                self.window.size_secs, self.window.hop_secs
            )));
        }
        if self.watermark.allowed_lateness_secs < 0 {
            return Err(ConfigError::Validation(
                "watermark.allowed_lateness_secs must be non-negative".to_string(),
            ));
        }
        if self.partitions == 0 {
            return Err(ConfigError::Validation(
                "partitions must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.checkpoint.max_retained == 0 {
            return Err(ConfigError::Validation(
                "checkpoint.max_retained must be at least 1".to_string(),
            ));
        }
        if self.checkpoint.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "checkpoint.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.publisher.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "publisher.max_attempts must be at least 1".to_string(),
            ));
        }
        if let StatsMode::Windowed { last_windows } = self.stats {
            if last_windows == 0 {
                return Err(ConfigError::Validation(
                    "stats.last_windows must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Window length as a duration
    pub fn window_size(&self) -> Duration {
        Duration::seconds(self.window.size_secs)
    }

    /// Window hop as a duration
    pub fn window_hop(&self) -> Duration {
        Duration::seconds(self.window.hop_secs)
    }

    /// Allowed lateness as a duration
    pub fn allowed_lateness(&self) -> Duration {
        Duration::seconds(self.watermark.allowed_lateness_secs)
    }

    /// Publisher retry policy in sink terms
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            max_attempts: self.publisher.max_attempts,
            base_backoff: std::time::Duration::from_millis(self.publisher.base_backoff_ms),
        }
    }
}

/// Window geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in seconds
    #[serde(default = "default_window_size_secs")]
    pub size_secs: i64,
    /// Hop between window starts in seconds
    #[serde(default = "default_window_hop_secs")]
    pub hop_secs: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size_secs: default_window_size_secs(),
            hop_secs: default_window_hop_secs(),
        }
    }
}

/// Watermark settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Maximum tolerated event-time delay in seconds
    #[serde(default = "default_allowed_lateness_secs")]
    pub allowed_lateness_secs: i64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            allowed_lateness_secs: default_allowed_lateness_secs(),
        }
    }
}

/// Checkpoint persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory checkpoints are written to
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
    /// Seconds between periodic checkpoints
    #[serde(default = "default_checkpoint_interval_secs")]
    pub interval_secs: u64,
    /// Checkpoint files retained per partition
    #[serde(default = "default_checkpoint_retained")]
    pub max_retained: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: default_checkpoint_dir(),
            interval_secs: default_checkpoint_interval_secs(),
            max_retained: default_checkpoint_retained(),
        }
    }
}

/// Sink retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherRetryConfig {
    /// Maximum write attempts per record
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for PublisherRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

fn default_window_size_secs() -> i64 {
    30 * 60
}

fn default_window_hop_secs() -> i64 {
    15 * 60
}

fn default_allowed_lateness_secs() -> i64 {
    15 * 60
}

fn default_partitions() -> usize {
    3
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("chk-point-dir")
}

fn default_checkpoint_interval_secs() -> u64 {
    60
}

fn default_checkpoint_retained() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size(), Duration::minutes(30));
        assert_eq!(config.window_hop(), Duration::minutes(15));
        assert_eq!(config.allowed_lateness(), Duration::minutes(15));
        assert_eq!(config.partitions, 3);
    }

    #[test]
    fn test_hop_larger_than_size_rejected() {
        let mut config = ProcessorConfig::default();
        config.window.hop_secs = config.window.size_secs + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let mut config = ProcessorConfig::default();
        config.partitions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_windowed_stats_capacity_rejected_at_zero() {
        let mut config = ProcessorConfig::default();
        config.stats = StatsMode::Windowed { last_windows: 0 };
        assert!(config.validate().is_err());

        config.stats = StatsMode::Windowed { last_windows: 8 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_lateness_rejected() {
        let mut config = ProcessorConfig::default();
        config.watermark.allowed_lateness_secs = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let figment = Figment::new().merge(figment::providers::Serialized::defaults(
            ProcessorConfig::default(),
        ));
        let config: ProcessorConfig = figment.extract().unwrap();
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.checkpoint.dir, PathBuf::from("chk-point-dir"));
    }

    #[test]
    fn test_publisher_config_projection() {
        let config = ProcessorConfig::default();
        let publisher = config.publisher_config();
        assert_eq!(publisher.max_attempts, 5);
        assert_eq!(publisher.base_backoff.as_millis(), 100);
    }
}
