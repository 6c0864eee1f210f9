use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::Span;

use crate::Error;
use crate::Result;

/// Identity attached to every log event emitted by a manager
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Logical service name (e.g. `billing-api`)
    #[serde(default)]
    pub service_name: String,

    /// Instance identifier, usually the pod or host name
    #[serde(default)]
    pub pod_name: String,
}

impl LogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.service_name.chars().any(char::is_whitespace) {
            return Err(Error::Config(ConfigError::Message(format!(
                "log.service_name must not contain whitespace: {:?}",
                self.service_name
            ))));
        }
        Ok(())
    }

    pub fn context(&self) -> LogContext {
        LogContext {
            service_name: self.service_name.clone(),
            pod_name: self.pod_name.clone(),
        }
    }
}

/// Builds per-module spans carrying the service/pod identity.
///
/// Every component logs inside its module span with an `operation` field,
/// so one subscriber filter covers both the typed and raw paths.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    service_name: String,
    pod_name: String,
}

impl LogContext {
    pub fn new(
        service_name: impl Into<String>,
        pod_name: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            pod_name: pod_name.into(),
        }
    }

    pub fn module_span(
        &self,
        module: &'static str,
    ) -> Span {
        tracing::info_span!(
            "d_config",
            service = %self.service_name,
            pod = %self.pod_name,
            module = module
        )
    }
}
