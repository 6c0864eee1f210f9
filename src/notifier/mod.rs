//! Prefix Notifier
//!
//! Registry of (prefix, callback) observers, independent of record shape.
//!
//! - On registration the observer is replayed every key currently cached under
//!   its prefix as a `Put`, so a late joiner catches up without a separate
//!   enumeration.
//! - Afterwards every applied event whose key matches the prefix is delivered
//!   synchronously on the dispatcher task that applied it. A slow callback
//!   delays later events of that registration; callbacks are expected to be
//!   fast.
//!
//! Callbacks always run outside of the observer table's locks, so they may
//! call back into the manager (including registering or removing observers).


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use tracing::debug;
use tracing::Span;

use crate::metrics::NOTIFICATIONS_DELIVERED;
use crate::store::matches_prefix;
use crate::EventKind;
use crate::LogContext;

/// Observer invoked with the changed key and the kind of change
pub type PrefixWatchCallback = Arc<dyn Fn(&str, EventKind) + Send + Sync>;

/// Identifier of a registered prefix watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefixWatcherId(u64);

struct PrefixWatcher {
    prefix: String,
    callback: PrefixWatchCallback,
}

struct NotifierInner {
    watchers: DashMap<PrefixWatcherId, PrefixWatcher>,
    next_id: AtomicU64,
    span: Span,
}

/// Fan-out of cache changes to prefix observers
#[derive(Clone)]
pub struct PrefixNotifier {
    inner: Arc<NotifierInner>,
}

impl std::fmt::Debug for PrefixNotifier {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PrefixNotifier")
            .field("watchers", &self.inner.watchers.len())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`PrefixNotifier::add_watcher`].
///
/// Dropping the handle leaves the watcher registered; call
/// [`remove`](Self::remove) to stop receiving notifications.
#[derive(Debug, Clone)]
pub struct PrefixWatcherHandle {
    id: PrefixWatcherId,
    prefix: String,
    notifier: Weak<NotifierInner>,
}

impl PrefixWatcherHandle {
    pub fn id(&self) -> PrefixWatcherId {
        self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Unregisters the watcher. Returns `false` if it was already gone.
    pub fn remove(self) -> bool {
        match self.notifier.upgrade() {
            Some(inner) => remove_watcher(&inner, self.id),
            None => false,
        }
    }
}

fn remove_watcher(
    inner: &NotifierInner,
    id: PrefixWatcherId,
) -> bool {
    let removed = inner.watchers.remove(&id);
    if let Some((_, watcher)) = &removed {
        debug!(
            parent: &inner.span,
            operation = "remove_prefix_watcher",
            prefix = %watcher.prefix,
            watcher_id = id.0,
            "prefix watcher removed"
        );
    }
    removed.is_some()
}

impl PrefixNotifier {
    pub fn new(log: &LogContext) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                watchers: DashMap::new(),
                next_id: AtomicU64::new(1),
                span: log.module_span("store"),
            }),
        }
    }

    /// Stores the observer, then replays the keys returned by `existing_keys`
    /// that match `prefix` to it as `Put` notifications before returning.
    ///
    /// `existing_keys` runs after the observer is stored, so a change applied
    /// concurrently is delivered at least once (live, replayed, or both).
    pub fn add_watcher<K>(
        &self,
        prefix: &str,
        callback: PrefixWatchCallback,
        existing_keys: K,
    ) -> PrefixWatcherHandle
    where
        K: FnOnce() -> Vec<String>,
    {
        let id = PrefixWatcherId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.watchers.insert(
            id,
            PrefixWatcher {
                prefix: prefix.to_string(),
                callback: callback.clone(),
            },
        );

        let mut replayed = 0usize;
        for key in existing_keys().iter().filter(|k| matches_prefix(k, prefix)) {
            callback(key.as_str(), EventKind::Put);
            replayed += 1;
        }
        NOTIFICATIONS_DELIVERED
            .with_label_values(&[EventKind::Put.as_str()])
            .inc_by(replayed as u64);

        debug!(
            parent: &self.inner.span,
            operation = "add_prefix_watcher",
            prefix,
            watcher_id = id.0,
            replayed,
            "prefix watcher added"
        );

        PrefixWatcherHandle {
            id,
            prefix: prefix.to_string(),
            notifier: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `false` if no watcher had this id
    pub fn remove(
        &self,
        id: PrefixWatcherId,
    ) -> bool {
        remove_watcher(&self.inner, id)
    }

    /// Invokes every observer whose prefix matches `key`.
    /// Returns the number of callbacks invoked.
    pub fn notify(
        &self,
        key: &str,
        kind: EventKind,
    ) -> usize {
        // Collect first: callbacks must not run under shard locks
        let matched: Vec<PrefixWatchCallback> = self
            .inner
            .watchers
            .iter()
            .filter(|entry| matches_prefix(key, &entry.value().prefix))
            .map(|entry| entry.value().callback.clone())
            .collect();

        for callback in &matched {
            callback(key, kind);
        }

        if !matched.is_empty() {
            NOTIFICATIONS_DELIVERED
                .with_label_values(&[kind.as_str()])
                .inc_by(matched.len() as u64);
        }
        matched.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }
}
