//! RemoteStore
//!
//! Boundary to the watchable key-value store that owns the configuration.
//! The crate never creates, authenticates or reconnects the client; it only
//! needs:
//! - a bulk prefix read for bootstrapping
//! - a long-lived prefix watch yielding ordered Put/Delete events
//! - single-key get, put and delete
//!
//! [`MemoryStore`] is an in-process implementation used for embedding and
//! tests.

mod event;
mod memory;


pub use event::*;
pub(crate) use event::matches_prefix;
pub use memory::*;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::Error;
use crate::Result;

/// Ordered change feed for one prefix.
///
/// An `Err` item is a transient per-event failure; the end of the stream means
/// the subscription is gone (connection closed or cancelled).
pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Returns every key/value pair currently stored under `prefix`
    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<KeyValue>>;

    /// Returns the value of a single key
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Bytes>>;

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<()>;

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()>;

    /// Subscribes to changes under `prefix`.
    ///
    /// Events for a given key arrive in commit order. No ordering is promised
    /// across keys.
    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<WatchStream>;
}

/// Rejects keys the store cannot address
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(())
}
