//! Store Manager
//!
//! Facade over the typed configuration cache. At build time every
//! `(prefix, shape)` registration:
//! 1. opens a watch on the prefix,
//! 2. loads the current values with a bulk prefix read,
//! 3. hands the watch to a background dispatcher that keeps the cache current.
//!
//! The watch is opened before the snapshot read, so a change committed while
//! the snapshot is in flight is replayed by the stream instead of being lost.
//!
//! Reads are served from memory and never touch the store. Writes go to the
//! store and only reach the cache once the store echoes them back on the
//! watch; a read issued right after a successful `put_config` may still see
//! the previous value.

mod dispatcher;
mod snapshot;


pub use dispatcher::TerminationReason;
pub use dispatcher::WatchStatus;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::Instrument;
use tracing::Span;

use self::dispatcher::WatchDispatcher;
use self::snapshot::load_snapshot;
use crate::store::validate_key;
use crate::utils::async_task::with_timeout;
use crate::CodecError;
use crate::EventKind;
use crate::PrefixNotifier;
use crate::PrefixWatcherHandle;
use crate::PrefixWatcherId;
use crate::RemoteStore;
use crate::Result;
use crate::Settings;
use crate::Shape;
use crate::ShapeId;
use crate::TypeRegistry;

struct Registration {
    prefix: String,
    shape: &'static str,
    status: watch::Receiver<WatchStatus>,
}

/// Builder collecting `(prefix, shape)` registrations before the first sync
///
/// # Examples
/// ```ignore
/// let manager = StoreManager::builder(store, settings)
///     .register::<DbConfig>("/cfg/db/")
///     .register::<FeatureFlag>("/cfg/flags/")
///     .build()
///     .await;
/// ```
pub struct StoreManagerBuilder {
    store: Arc<dyn RemoteStore>,
    settings: Settings,
    registry: TypeRegistry,
    pending: Vec<(String, ShapeId)>,
}

impl StoreManagerBuilder {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        settings: Settings,
    ) -> Self {
        let registry = TypeRegistry::new(&settings.log.context());
        Self {
            store,
            settings,
            registry,
            pending: Vec::new(),
        }
    }

    /// Watches `prefix` and decodes every value under it as `T`.
    ///
    /// A shape may be registered under several prefixes; they share one table.
    ///
    /// # Panics
    /// If `prefix` is empty.
    pub fn register<T: Shape>(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into();
        assert!(!prefix.is_empty(), "watch registration requires a non-empty prefix");
        let shape = self.registry.register::<T>();
        self.pending.push((prefix, shape));
        self
    }

    /// Bootstraps every registration in order and starts its watch loop.
    ///
    /// Never fails: a registration whose subscription or snapshot fails is
    /// logged and reflected in [`StoreManager::watch_status`].
    pub async fn build(self) -> StoreManager {
        let StoreManagerBuilder {
            store,
            settings,
            registry,
            pending,
        } = self;

        let log = settings.log.context();
        let span = log.module_span("store");
        let registry = Arc::new(registry);
        let notifier = PrefixNotifier::new(&log);
        let shutdown = CancellationToken::new();
        let mut registrations = Vec::with_capacity(pending.len());
        let mut tasks = Vec::with_capacity(pending.len());

        for (prefix, shape) in pending {
            let (status_tx, status_rx) = watch::channel(WatchStatus::Initializing);

            let stream = match store.watch_prefix(&prefix).await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    error!(parent: &span, operation = "watch", prefix = %prefix, error = %e, "watch subscription failed");
                    status_tx.send_replace(WatchStatus::Terminated(TerminationReason::SubscribeFailed(
                        e.to_string(),
                    )));
                    None
                }
            };

            if let Err(e) = load_snapshot(
                store.as_ref(),
                &registry,
                shape,
                &prefix,
                settings.store.snapshot_timeout(),
                &span,
            )
            .await
            {
                error!(parent: &span, operation = "snapshot", prefix = %prefix, error = %e, "snapshot load failed");
            }

            if let Some(stream) = stream {
                // Snapshot is applied; events from here on come from the stream
                status_tx.send_replace(WatchStatus::Streaming);
                let dispatcher = WatchDispatcher::new(
                    prefix.clone(),
                    shape,
                    registry.clone(),
                    notifier.clone(),
                    status_tx,
                    shutdown.clone(),
                    span.clone(),
                );
                tasks.push(tokio::spawn(dispatcher.run(stream).instrument(span.clone())));
            }

            registrations.push(Registration {
                prefix,
                shape: registry.shape_name(shape),
                status: status_rx,
            });
        }

        info!(
            parent: &span,
            registrations = registrations.len(),
            cached = registry.len(),
            "store manager started"
        );

        StoreManager {
            store,
            registry,
            notifier,
            registrations,
            tasks: Mutex::new(tasks),
            shutdown,
            settings,
            span,
        }
    }
}

/// Typed, always-current in-memory view of the registered prefixes
pub struct StoreManager {
    store: Arc<dyn RemoteStore>,
    registry: Arc<TypeRegistry>,
    notifier: PrefixNotifier,
    registrations: Vec<Registration>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    settings: Settings,
    span: Span,
}

impl std::fmt::Debug for StoreManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let prefixes: Vec<_> = self.registrations.iter().map(|r| (&r.prefix, r.shape)).collect();
        f.debug_struct("StoreManager")
            .field("registrations", &prefixes)
            .field("registry", &self.registry)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl StoreManager {
    pub fn builder(
        store: Arc<dyn RemoteStore>,
        settings: Settings,
    ) -> StoreManagerBuilder {
        StoreManagerBuilder::new(store, settings)
    }

    /// Returns a copy of the record cached under `key`.
    ///
    /// Absent keys, empty keys, keys cached under another shape and shapes
    /// never registered all read as `None`.
    pub fn get_config<T: Shape>(
        &self,
        key: &str,
    ) -> Option<T> {
        if key.is_empty() {
            debug!(parent: &self.span, operation = "get_config", "empty key");
            return None;
        }
        self.registry.get(key)
    }

    /// Like [`get_config`](Self::get_config), but reports an empty key as
    /// [`Error::InvalidKey`](crate::Error::InvalidKey) and an unregistered shape as
    /// [`Error::ShapeNotRegistered`](crate::Error::ShapeNotRegistered).
    pub fn try_get_config<T: Shape>(
        &self,
        key: &str,
    ) -> Result<Option<T>> {
        validate_key(key)?;
        self.registry.try_get(key)
    }

    /// Every cached key starting with `prefix`, across all shapes
    pub fn list_keys(
        &self,
        prefix: &str,
    ) -> Vec<String> {
        self.registry.list_keys(prefix)
    }

    /// Number of cached records across all shapes
    pub fn cached_len(&self) -> usize {
        self.registry.len()
    }

    /// Encodes `value` and writes it to the store.
    ///
    /// Encoding happens before any request is made. The cache is updated
    /// only when the watch delivers the change, so this is not
    /// read-your-write.
    pub async fn put_config<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<()> {
        validate_key(key)?;
        let raw = serde_json::to_vec(value).map_err(|source| CodecError::Encode {
            shape: std::any::type_name::<T>(),
            source,
        })?;

        let timeout = self.settings.store.request_timeout();
        match with_timeout("put", timeout, self.store.put(key, Bytes::from(raw))).await {
            Ok(()) => {
                debug!(parent: &self.span, operation = "put_config", key, "config written");
                Ok(())
            }
            Err(e) => {
                error!(parent: &self.span, operation = "put_config", key, error = %e, "config write failed");
                Err(e)
            }
        }
    }

    /// Deletes `key` from the store. Same visibility rules as
    /// [`put_config`](Self::put_config).
    pub async fn delete_config(
        &self,
        key: &str,
    ) -> Result<()> {
        validate_key(key)?;

        let timeout = self.settings.store.request_timeout();
        match with_timeout("delete", timeout, self.store.delete(key)).await {
            Ok(()) => {
                debug!(parent: &self.span, operation = "delete_config", key, "config deleted");
                Ok(())
            }
            Err(e) => {
                error!(parent: &self.span, operation = "delete_config", key, error = %e, "config delete failed");
                Err(e)
            }
        }
    }

    /// Registers `callback` for changes under `prefix`.
    ///
    /// Before returning, the callback is replayed every key currently cached
    /// under `prefix` as [`EventKind::Put`]. Afterwards it runs on the
    /// dispatcher task for every applied change whose key matches.
    pub fn add_prefix_watcher<F>(
        &self,
        prefix: &str,
        callback: F,
    ) -> PrefixWatcherHandle
    where
        F: Fn(&str, EventKind) + Send + Sync + 'static,
    {
        self.notifier
            .add_watcher(prefix, Arc::new(callback), || self.registry.list_keys(prefix))
    }

    /// Returns `false` if the watcher was already removed
    pub fn remove_prefix_watcher(
        &self,
        id: PrefixWatcherId,
    ) -> bool {
        self.notifier.remove(id)
    }

    pub fn prefix_watcher_count(&self) -> usize {
        self.notifier.watcher_count()
    }

    /// Current status of the first registration on `prefix`
    pub fn watch_status(
        &self,
        prefix: &str,
    ) -> Option<WatchStatus> {
        self.registrations
            .iter()
            .find(|r| r.prefix == prefix)
            .map(|r| r.status.borrow().clone())
    }

    /// Status of every registration, in registration order
    pub fn watch_statuses(&self) -> Vec<(String, WatchStatus)> {
        self.registrations
            .iter()
            .map(|r| (r.prefix.clone(), r.status.borrow().clone()))
            .collect()
    }

    /// Receiver that observes status transitions of the first registration
    /// on `prefix`
    pub fn subscribe_status(
        &self,
        prefix: &str,
    ) -> Option<watch::Receiver<WatchStatus>> {
        self.registrations
            .iter()
            .find(|r| r.prefix == prefix)
            .map(|r| r.status.clone())
    }

    /// True when every registration is streaming
    pub fn is_healthy(&self) -> bool {
        self.registrations.iter().all(|r| r.status.borrow().is_streaming())
    }

    /// The store this manager syncs from
    pub fn store(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }

    /// Stops every watch loop and waits for them to exit.
    ///
    /// The cache stays readable afterwards, frozen at its last state.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(parent: &self.span, error = %e, "watch task panicked");
            }
        }
        info!(parent: &self.span, "store manager stopped");
    }
}

impl Drop for StoreManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
