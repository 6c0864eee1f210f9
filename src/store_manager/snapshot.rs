use std::time::Duration;

use tracing::info;
use tracing::Span;

use crate::utils::async_task::with_timeout;
use crate::RemoteStore;
use crate::Result;
use crate::ShapeId;
use crate::TypeRegistry;

/// Outcome of bootstrapping one registration from a bulk prefix read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Entries decoded into the cache
    pub loaded: usize,
    /// Entries skipped because they failed to decode
    pub rejected: usize,
}

/// Reads every value under `prefix` and stores the ones that decode.
///
/// The read is bounded by `deadline`; on timeout or read failure nothing is
/// cached and the error is returned to the caller.
pub(crate) async fn load_snapshot(
    store: &dyn RemoteStore,
    registry: &TypeRegistry,
    shape: ShapeId,
    prefix: &str,
    deadline: Duration,
    span: &Span,
) -> Result<SnapshotReport> {
    let entries = with_timeout("snapshot", deadline, store.get_prefix(prefix)).await?;

    let mut report = SnapshotReport::default();
    for kv in entries {
        // Decode failures are logged by the registry
        match registry.put(shape, &kv.key, &kv.value) {
            Ok(()) => report.loaded += 1,
            Err(_) => report.rejected += 1,
        }
    }

    info!(
        parent: span,
        operation = "snapshot",
        prefix,
        shape = registry.shape_name(shape),
        loaded = report.loaded,
        rejected = report.rejected,
        "snapshot loaded"
    );
    Ok(report)
}
