use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch stream tuning
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Capacity of the in-process store's change broadcast.
    ///
    /// A subscriber that falls further behind than this observes a
    /// `WatchLagged` error and misses the overwritten events.
    ///
    /// **Default**: 1024
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.event_buffer_size must be > 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_event_buffer_size() -> usize {
    1024
}
