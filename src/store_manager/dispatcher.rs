//! Per-registration watch loop
//!
//! One dispatcher task runs for every `(prefix, shape)` registration. It
//! applies each event to that shape's table and then fans the change out to
//! prefix watchers. Events are handled strictly one after another, so changes
//! to a key land in the cache in the order the store committed them.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing::Span;

use crate::metrics::record_watch_lag;
use crate::metrics::ACTIVE_WATCHES;
use crate::metrics::EVENTS_APPLIED;
use crate::EventKind;
use crate::PrefixNotifier;
use crate::ShapeId;
use crate::TypeRegistry;
use crate::WatchEvent;
use crate::WatchStream;

/// Why a watch loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The store ended the stream (connection closed)
    StreamClosed,
    /// The owning manager shut down
    Cancelled,
    /// The subscription could not be opened at startup
    SubscribeFailed(String),
}

/// Lifecycle of one registration's watch loop.
///
/// A terminated watch is never resubscribed; the cache for that prefix is
/// frozen at its last applied state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus {
    /// Snapshot load in progress
    Initializing,
    /// Live events are being applied
    Streaming,
    Terminated(TerminationReason),
}

impl WatchStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, WatchStatus::Streaming)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, WatchStatus::Terminated(_))
    }
}

pub(crate) struct WatchDispatcher {
    prefix: String,
    shape: ShapeId,
    registry: Arc<TypeRegistry>,
    notifier: PrefixNotifier,
    status: watch::Sender<WatchStatus>,
    shutdown: CancellationToken,
    span: Span,
}

impl WatchDispatcher {
    pub(crate) fn new(
        prefix: String,
        shape: ShapeId,
        registry: Arc<TypeRegistry>,
        notifier: PrefixNotifier,
        status: watch::Sender<WatchStatus>,
        shutdown: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            prefix,
            shape,
            registry,
            notifier,
            status,
            shutdown,
            span,
        }
    }

    /// Applies events until the stream ends or the manager shuts down
    pub(crate) async fn run(
        self,
        mut stream: WatchStream,
    ) {
        let shape = self.registry.shape_name(self.shape);
        ACTIVE_WATCHES.with_label_values(&["store"]).inc();
        self.status.send_replace(WatchStatus::Streaming);
        info!(parent: &self.span, operation = "watch", prefix = %self.prefix, shape, "watch started");

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break TerminationReason::Cancelled,

                next = stream.next() => match next {
                    Some(Ok(event)) => self.apply(event),
                    Some(Err(e)) => match record_watch_lag("store", &self.prefix, &e) {
                        Some(skipped) => {
                            error!(
                                parent: &self.span,
                                operation = "watch",
                                prefix = %self.prefix,
                                skipped,
                                "watch lagged, cache may miss skipped changes"
                            );
                        }
                        None => {
                            warn!(
                                parent: &self.span,
                                operation = "watch",
                                prefix = %self.prefix,
                                error = %e,
                                "watch error, continuing"
                            );
                        }
                    },
                    None => break TerminationReason::StreamClosed,
                },
            }
        };

        ACTIVE_WATCHES.with_label_values(&["store"]).dec();
        info!(
            parent: &self.span,
            operation = "watch",
            prefix = %self.prefix,
            reason = ?reason,
            "watch stopped"
        );
        self.status.send_replace(WatchStatus::Terminated(reason));
    }

    /// Updates the cache, then notifies prefix watchers.
    ///
    /// A value that fails to decode leaves the cache untouched and is not
    /// announced.
    pub(crate) fn apply(
        &self,
        event: WatchEvent,
    ) {
        match event.kind {
            EventKind::Put => {
                let Some(value) = event.value.as_ref() else {
                    warn!(parent: &self.span, operation = "watch", key = %event.key, "put event without value");
                    return;
                };
                if self.registry.put(self.shape, &event.key, value).is_err() {
                    return;
                }
            }
            EventKind::Delete => {
                self.registry.remove(self.shape, &event.key);
            }
        }

        EVENTS_APPLIED
            .with_label_values(&[self.registry.shape_name(self.shape), event.kind.as_str()])
            .inc();
        let notified = self.notifier.notify(&event.key, event.kind);
        debug!(
            parent: &self.span,
            operation = "watch",
            key = %event.key,
            kind = %event.kind,
            notified,
            "event applied"
        );
    }
}
