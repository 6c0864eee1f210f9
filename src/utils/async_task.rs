use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::error;
use tracing::warn;
use tracing::Instrument;
use tracing::Span;

use crate::Result;
use crate::StoreError;

/// Runs a single store request under `duration`.
///
/// Elapsed deadlines surface as [`StoreError::Timeout`] tagged with
/// `operation`.
pub(crate) async fn with_timeout<F, T>(
    operation: &'static str,
    duration: Duration,
    task: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, task).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, ?duration, "store request timed out");
            Err(StoreError::Timeout { operation, duration }.into())
        }
    }
}

// Helper function to spawn background loops and log how they ended
pub(crate) fn spawn_task<Fut>(
    name: &'static str,
    span: Span,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(
        async move {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "spawned task stopped with an error");
            }
        }
        .instrument(span),
    )
}
