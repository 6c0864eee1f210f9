//! Raw Watch Manager
//!
//! Untyped access to the store: callbacks receive the raw event bytes and
//! single-key operations pass values through unchanged. Nothing is cached.


use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing::Span;

use crate::metrics::record_watch_lag;
use crate::metrics::ACTIVE_WATCHES;
use crate::store::validate_key;
use crate::utils::async_task::spawn_task;
use crate::utils::async_task::with_timeout;
use crate::Error;
use crate::RemoteStore;
use crate::Result;
use crate::Settings;
use crate::StoreConfig;
use crate::StoreError;
use crate::TerminationReason;
use crate::WatchEvent;
use crate::WatchStatus;
use crate::WatchStream;

/// Error type raw callbacks may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked for every event on a raw watch. An `Err` is logged and
/// does not stop the watch.
pub type WatchCallback = Arc<dyn Fn(&WatchEvent) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Handle to one raw watch.
///
/// Dropping the handle leaves the watch running; it stops on
/// [`cancel`](Self::cancel), on manager shutdown, or when the store closes
/// the stream.
#[derive(Debug, Clone)]
pub struct RawWatch {
    key: String,
    status: watch::Receiver<WatchStatus>,
    cancel: CancellationToken,
}

impl RawWatch {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> WatchStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<WatchStatus> {
        self.status.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct RawWatchManager {
    store: Arc<dyn RemoteStore>,
    config: StoreConfig,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    span: Span,
}

impl std::fmt::Debug for RawWatchManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RawWatchManager")
            .field("config", &self.config)
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RawWatchManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            config: settings.store.clone(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            span: settings.log.context().module_span("watcher"),
        }
    }

    /// Subscribes `callback` to every key starting with `key`.
    ///
    /// Values already stored under `key` are delivered as `Put` events before
    /// this returns; later changes are delivered from a background task in
    /// commit order per key.
    pub async fn watch<F>(
        &self,
        key: &str,
        callback: F,
    ) -> Result<RawWatch>
    where
        F: Fn(&WatchEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        validate_key(key)?;
        let callback: WatchCallback = Arc::new(callback);

        // Subscribe first so changes racing the snapshot read are not lost
        let stream = self.store.watch_prefix(key).await.map_err(|e| {
            error!(parent: &self.span, operation = "subscribe", key, error = %e, "watch subscription failed");
            e
        })?;

        let snapshot = with_timeout("snapshot", self.config.snapshot_timeout(), self.store.get_prefix(key))
            .await
            .map_err(|e| {
                error!(parent: &self.span, operation = "subscribe", key, error = %e, "snapshot read failed");
                e
            })?;

        let replayed = snapshot.len();
        for kv in snapshot {
            deliver(&callback, &WatchEvent::from(kv), &self.span);
        }

        let cancel = self.shutdown.child_token();
        let (status_tx, status) = watch::channel(WatchStatus::Streaming);
        let task = spawn_task(
            "raw_watch",
            self.span.clone(),
            run_watch(
                key.to_string(),
                stream,
                callback,
                status_tx,
                cancel.clone(),
                self.span.clone(),
            ),
        );
        {
            let mut tasks = self.tasks.lock();
            tasks.retain(|t| !t.is_finished());
            tasks.push(task);
        }

        info!(parent: &self.span, operation = "subscribe", key, replayed, "watch subscribed");
        Ok(RawWatch {
            key: key.to_string(),
            status,
            cancel,
        })
    }

    /// Writes raw bytes under `key`
    pub async fn watch_put(
        &self,
        key: &str,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        validate_key(key)?;
        let timeout = self.config.request_timeout();
        with_timeout("put", timeout, self.store.put(key, value.into()))
            .await
            .map_err(|e| {
                error!(parent: &self.span, operation = "put", key, error = %e, "raw put failed");
                e
            })?;
        debug!(parent: &self.span, operation = "put", key, "raw value written");
        Ok(())
    }

    pub async fn watch_delete(
        &self,
        key: &str,
    ) -> Result<()> {
        validate_key(key)?;
        let timeout = self.config.request_timeout();
        with_timeout("delete", timeout, self.store.delete(key))
            .await
            .map_err(|e| {
                error!(parent: &self.span, operation = "delete", key, error = %e, "raw delete failed");
                e
            })?;
        debug!(parent: &self.span, operation = "delete", key, "raw value deleted");
        Ok(())
    }

    /// Reads the raw bytes stored under exactly `key`.
    ///
    /// Returns [`Error::NotFound`] when the key is absent.
    pub async fn watch_get(
        &self,
        key: &str,
    ) -> Result<Bytes> {
        validate_key(key)?;
        let timeout = self.config.request_timeout();
        with_timeout("get", timeout, self.store.get(key))
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Number of raw watch loops still running
    pub fn active_watches(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    pub fn store(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }

    /// Stops every raw watch and waits for the loops to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(parent: &self.span, error = %e, "raw watch task panicked");
            }
        }
        info!(parent: &self.span, "raw watch manager stopped");
    }
}

impl Drop for RawWatchManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn deliver(
    callback: &WatchCallback,
    event: &WatchEvent,
    span: &Span,
) {
    if let Err(e) = callback(event) {
        error!(
            parent: span,
            operation = "subscribe",
            key = %event.key,
            kind = %event.kind,
            error = %e,
            "watch callback failed"
        );
    }
}

async fn run_watch(
    key: String,
    mut stream: WatchStream,
    callback: WatchCallback,
    status: watch::Sender<WatchStatus>,
    cancel: CancellationToken,
    span: Span,
) -> Result<()> {
    ACTIVE_WATCHES.with_label_values(&["watcher"]).inc();

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break TerminationReason::Cancelled,

            next = stream.next() => match next {
                Some(Ok(event)) => deliver(&callback, &event, &span),
                Some(Err(e)) => match record_watch_lag("watcher", &key, &e) {
                    Some(skipped) => {
                        error!(parent: &span, operation = "subscribe", key = %key, skipped, "watch lagged, events skipped");
                    }
                    None => {
                        warn!(parent: &span, operation = "subscribe", key = %key, error = %e, "watch error, continuing");
                    }
                },
                None => break TerminationReason::StreamClosed,
            },
        }
    };

    ACTIVE_WATCHES.with_label_values(&["watcher"]).dec();
    let closed = reason == TerminationReason::StreamClosed;
    status.send_replace(WatchStatus::Terminated(reason));

    if closed {
        return Err(StoreError::WatchFailed {
            prefix: key,
            message: "stream closed by store".to_string(),
        }
        .into());
    }
    debug!(parent: &span, operation = "subscribe", key = %key, "raw watch cancelled");
    Ok(())
}
