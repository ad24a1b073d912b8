//! Configuration for the conferencing subsystem
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [conference]
//! default_call_type = "Video"
//! history_capacity = 100
//!
//! [aggregator]
//! incoming_call_timeout_secs = 60
//! auto_join_held_calls = true
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ConferenceError, Result};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::logging::LoggingConfig;
use crate::types::CallType;

/// Conference manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceConfig {
    /// Call type used when a dial request does not name one
    pub default_call_type: CallType,
    /// Capacity of the recent conference and participant queues
    pub history_capacity: usize,
    /// Buffer size of the manager event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            default_call_type: CallType::Video,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            event_channel_capacity: 256,
        }
    }
}

impl ConferenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_call_type(mut self, call_type: CallType) -> Self {
        self.default_call_type = call_type;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_call_type == CallType::Unknown {
            return Err(ConferenceError::config("default_call_type must be Audio or Video"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConferenceError::config("event_channel_capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// Per-device call aggregator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Unanswered incoming calls are rejected after this many seconds (0 disables)
    pub incoming_call_timeout_secs: u64,
    /// Join a newly created call with a call the device has on hold
    pub auto_join_held_calls: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            incoming_call_timeout_secs: 60,
            auto_join_held_calls: true,
        }
    }
}

impl AggregatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incoming_call_timeout(mut self, timeout: Duration) -> Self {
        self.incoming_call_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_auto_join_held_calls(mut self, enabled: bool) -> Self {
        self.auto_join_held_calls = enabled;
        self
    }

    pub fn incoming_call_timeout(&self) -> Option<Duration> {
        (self.incoming_call_timeout_secs > 0).then(|| Duration::from_secs(self.incoming_call_timeout_secs))
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub conference: ConferenceConfig,
    pub aggregator: AggregatorConfig,
    pub logging: LoggingConfig,
}

impl RoomConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: RoomConfig = toml::from_str(contents)?;
        config.conference.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConferenceError::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }
}
