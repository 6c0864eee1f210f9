//! Configuration Cache Error Hierarchy
//!
//! Errors are split by the layer that produced them: the remote store, the
//! value codec and caller input. Failures while applying a single watch event
//! never surface here; they are logged by the dispatcher instead.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote store failures (connection, timeout, rejected operation)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization failures for record values
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Settings loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Empty or otherwise unusable key supplied by the caller
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    /// Lookup for a record shape that was never registered
    #[error("Record shape {shape} is not registered")]
    ShapeNotRegistered { shape: &'static str },

    /// Raw lookup for a key the store does not hold
    #[error("Key not found: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store client was closed by its owner
    #[error("Remote store connection closed")]
    ConnectionClosed,

    /// Single-shot request exceeded its deadline
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// Store rejected or failed a read
    #[error("Get operation failed: {0}")]
    GetFailed(String),

    #[error("Put operation failed: {0}")]
    PutFailed(String),

    #[error("Delete operation failed: {0}")]
    DeleteFailed(String),

    /// Watch subscription could not be established
    #[error("Watch on {prefix} failed: {message}")]
    WatchFailed { prefix: String, message: String },

    /// Subscriber fell behind and the store dropped events for it
    #[error("Watch on {prefix} lagged, {skipped} events skipped")]
    WatchLagged { prefix: String, skipped: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode {shape}: {source}")]
    Encode {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode {shape} at {key}: {source}")]
    Decode {
        shape: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// True for failures that originate in the remote store
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}
