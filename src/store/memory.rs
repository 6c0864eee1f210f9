use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::matches_prefix;
use super::KeyValue;
use super::RemoteStore;
use super::WatchEvent;
use super::WatchStream;
use crate::Result;
use crate::StoreError;
use crate::WatchConfig;

/// In-process watchable key-value store
///
/// Keys live in an ordered map; every committed change is published on a
/// broadcast channel while the write lock is still held, so subscribers see
/// changes to one key in commit order.
///
/// [`close`](Self::close) ends every open watch stream and rejects further
/// requests, the way a closed remote connection would.
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Bytes>>,
    events: broadcast::Sender<WatchEvent>,
    closed: CancellationToken,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WatchConfig::default().event_buffer_size)
    }
}

impl MemoryStore {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer_size.max(1));
        Self {
            data: RwLock::new(BTreeMap::new()),
            events,
            closed: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.event_buffer_size)
    }

    /// Closes the store: open watch streams end, new requests fail
    pub fn close(&self) {
        debug!("MemoryStore closed");
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live watch subscriptions
    pub fn watcher_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(StoreError::ConnectionClosed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<KeyValue>> {
        self.ensure_open()?;

        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| matches_prefix(k, prefix))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<()> {
        self.ensure_open()?;

        let mut data = self.data.write();
        data.insert(key.to_string(), value.clone());
        // No receivers is not an error
        let _ = self.events.send(WatchEvent::put(key, value));
        trace!(key, "MemoryStore put");
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.ensure_open()?;

        let mut data = self.data.write();
        if data.remove(key).is_some() {
            let _ = self.events.send(WatchEvent::delete(key));
            trace!(key, "MemoryStore delete");
        }
        Ok(())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<WatchStream> {
        self.ensure_open()?;

        let prefix = prefix.to_string();
        let receiver = self.events.subscribe();
        let stream = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let out = match item {
                    Ok(event) if matches_prefix(&event.key, &prefix) => Some(Ok(event)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Err(StoreError::WatchLagged {
                        prefix: prefix.clone(),
                        skipped,
                    }
                    .into())),
                };
                future::ready(out)
            })
            .take_until(self.closed.clone().cancelled_owned())
            .boxed();

        Ok(stream)
    }
}
