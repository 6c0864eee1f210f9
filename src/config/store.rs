use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Deadlines for requests issued against the remote store
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Deadline for single-key put/delete/get (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Deadline for each bulk prefix read during bootstrap (milliseconds)
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.request_timeout_ms must be greater than 0".into(),
            )));
        }

        if self.snapshot_timeout_ms < self.request_timeout_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "store.snapshot_timeout_ms {}ms should not be less than request_timeout_ms {}ms",
                self.snapshot_timeout_ms, self.request_timeout_ms
            ))));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_snapshot_timeout_ms() -> u64 {
    10_000
}
