//! Collector configuration.
//!
//! Every capacity parameter is fixed at initialization time; the collector
//! never grows or shrinks afterwards. `validate` belongs to the
//! configuration-loading layer: `init` itself trusts its input, so values
//! coming from user input must be checked first.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Default maximum number of distinct statements tracked between resets.
pub const DEFAULT_MAX_ENTRIES: usize = 5000;
/// Allowed range for `max_entries`.
pub const MAX_ENTRIES_RANGE: RangeInclusive<usize> = 100..=100_000;

/// Default size of the reserved event buffer, bytes (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1_048_576;
/// Allowed range for `buffer_size` (64 KiB to 10 MiB).
pub const BUFFER_SIZE_RANGE: RangeInclusive<usize> = 65_536..=10_485_760;

/// Default sampling rate, percent.
pub const DEFAULT_SAMPLE_RATE: u32 = 100;
/// Allowed range for `sample_rate_percent`.
pub const SAMPLE_RATE_RANGE: RangeInclusive<u32> = 1..=100;

/// Runtime configuration for the statistics collector.
///
/// Mirrors the knobs a host engine exposes to its operators: capacity of the
/// statement table, size of the reserved event buffer, a master switch, and
/// the sampling rate.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CollectorConfig {
    /// Maximum number of distinct statements tracked between resets.
    pub max_entries: usize,

    /// Size of the reserved event ring buffer, bytes.
    pub buffer_size: usize,

    /// Master switch; when false every record call is a no-op.
    pub enabled: bool,

    /// Percentage of executions recorded, 1..=100.
    pub sample_rate_percent: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            buffer_size: DEFAULT_BUFFER_SIZE,
            enabled: true,
            sample_rate_percent: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl CollectorConfig {
    /// Checks every parameter against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !MAX_ENTRIES_RANGE.contains(&self.max_entries) {
            return Err(ConfigError::MaxEntriesOutOfRange(self.max_entries));
        }
        if !BUFFER_SIZE_RANGE.contains(&self.buffer_size) {
            return Err(ConfigError::BufferSizeOutOfRange(self.buffer_size));
        }
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate_percent) {
            return Err(ConfigError::SampleRateOutOfRange(self.sample_rate_percent));
        }
        Ok(())
    }
}

/// Error type for configuration validation.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_entries` outside `MAX_ENTRIES_RANGE`.
    MaxEntriesOutOfRange(usize),
    /// `buffer_size` outside `BUFFER_SIZE_RANGE`.
    BufferSizeOutOfRange(usize),
    /// `sample_rate_percent` outside `SAMPLE_RATE_RANGE`.
    SampleRateOutOfRange(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MaxEntriesOutOfRange(n) => write!(
                f,
                "max_entries {} out of range [{}, {}]",
                n,
                MAX_ENTRIES_RANGE.start(),
                MAX_ENTRIES_RANGE.end()
            ),
            ConfigError::BufferSizeOutOfRange(n) => write!(
                f,
                "buffer_size {} out of range [{}, {}]",
                n,
                BUFFER_SIZE_RANGE.start(),
                BUFFER_SIZE_RANGE.end()
            ),
            ConfigError::SampleRateOutOfRange(n) => write!(
                f,
                "sample_rate_percent {} out of range [{}, {}]",
                n,
                SAMPLE_RATE_RANGE.start(),
                SAMPLE_RATE_RANGE.end()
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert_eq!(CollectorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn range_boundaries_are_inclusive() {
        let mut config = CollectorConfig::default();

        config.max_entries = *MAX_ENTRIES_RANGE.start();
        assert_eq!(config.validate(), Ok(()));
        config.max_entries = *MAX_ENTRIES_RANGE.end();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn out_of_range_max_entries_is_rejected() {
        let config = CollectorConfig {
            max_entries: 99,
            ..CollectorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MaxEntriesOutOfRange(99)));
    }

    #[test]
    fn out_of_range_buffer_size_is_rejected() {
        let config = CollectorConfig {
            buffer_size: 1024,
            ..CollectorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BufferSizeOutOfRange(1024))
        );
    }

    #[test]
    fn out_of_range_sample_rate_is_rejected() {
        let zero = CollectorConfig {
            sample_rate_percent: 0,
            ..CollectorConfig::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::SampleRateOutOfRange(0)));

        let over = CollectorConfig {
            sample_rate_percent: 101,
            ..CollectorConfig::default()
        };
        assert_eq!(
            over.validate(),
            Err(ConfigError::SampleRateOutOfRange(101))
        );
    }

    #[test]
    fn config_error_messages_name_the_parameter() {
        let err = ConfigError::BufferSizeOutOfRange(42);
        assert!(err.to_string().contains("buffer_size 42"));
    }
}
