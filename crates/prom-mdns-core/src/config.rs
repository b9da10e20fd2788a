//! Configuration types for the discovery engine
//!
//! This module defines all configuration structures used throughout the crate.

use crate::target::OutputFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service name for plain-HTTP metrics endpoints
pub const HTTP_SERVICE: &str = "_prometheus-http._tcp";

/// Service name for HTTPS metrics endpoints
pub const HTTPS_SERVICE: &str = "_prometheus-https._tcp";

/// Main discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Service names queried on every refresh cycle
    #[serde(default = "default_service_names")]
    pub service_names: Vec<String>,

    /// Substring of a service name that selects the `https` scheme
    #[serde(default = "default_secure_marker")]
    pub secure_marker: String,

    /// Refresh interval (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Where committed output goes
    #[serde(default)]
    pub output: OutputConfig,

    /// Wire format of committed output
    #[serde(default)]
    pub format: OutputFormat,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DiscoveryConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            service_names: default_service_names(),
            secure_marker: default_secure_marker(),
            interval_ms: default_interval_ms(),
            output: OutputConfig::default(),
            format: OutputFormat::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the refresh interval
    ///
    /// The interval is kept in whole milliseconds; any sub-millisecond part
    /// is dropped.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replace the queried service names
    pub fn with_service_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Refresh interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.service_names.is_empty() {
            return Err(crate::Error::config("No service names configured"));
        }

        if self.service_names.iter().any(|n| n.trim().is_empty()) {
            return Err(crate::Error::config("Service names cannot be empty"));
        }

        if self.secure_marker.is_empty() {
            return Err(crate::Error::config("Secure service marker cannot be empty"));
        }

        if self.interval_ms == 0 {
            return Err(crate::Error::config("Refresh interval must be > 0"));
        }

        self.output.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Output destination configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    /// Write to stdout
    #[default]
    Console,

    /// Atomically replace a file
    File {
        /// Path to the output file
        path: String,
    },
}

impl OutputConfig {
    /// Parse the `--out` argument: `-` selects the console, anything else a file
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            OutputConfig::Console
        } else {
            OutputConfig::File {
                path: arg.to_string(),
            }
        }
    }

    /// Validate the output configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            OutputConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Output file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the per-lookup response buffer
    #[serde(default = "default_lookup_buffer_capacity")]
    pub lookup_buffer_capacity: usize,

    /// Capacity of the channel carrying aggregates to the sink
    ///
    /// When full, the scheduler waits for the sink before the next cycle.
    #[serde(default = "default_aggregate_channel_capacity")]
    pub aggregate_channel_capacity: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.lookup_buffer_capacity == 0 {
            return Err(crate::Error::config("Lookup buffer capacity must be > 0"));
        }
        if self.aggregate_channel_capacity == 0 {
            return Err(crate::Error::config(
                "Aggregate channel capacity must be > 0",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookup_buffer_capacity: default_lookup_buffer_capacity(),
            aggregate_channel_capacity: default_aggregate_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_service_names() -> Vec<String> {
    vec![HTTP_SERVICE.to_string(), HTTPS_SERVICE.to_string()]
}

fn default_secure_marker() -> String {
    HTTPS_SERVICE.to_string()
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_lookup_buffer_capacity() -> usize {
    100
}

fn default_aggregate_channel_capacity() -> usize {
    1
}

fn default_event_channel_capacity() -> usize {
    1000
}
