use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;

use crate::NetworkError;
use crate::Result;

/// Runs `task` with a deadline, mapping an expired deadline to
/// [`NetworkError::Timeout`].
pub(crate) async fn task_with_timeout<F, T>(
    request_type: &'static str,
    timeout_duration: Duration,
    task: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(timeout_duration, task).await {
        Ok(r) => r,
        Err(_) => Err(NetworkError::Timeout {
            request_type,
            duration: timeout_duration,
        }
        .into()),
    }
}

/// Spawns a named background task on `tracker` and logs how it ended.
pub(crate) fn spawn_task<F, Fut>(
    name: &'static str,
    tracker: &TaskTracker,
    task_fn: F,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tracker.spawn(async move {
        match task_fn().await {
            Ok(()) => debug!(task = name, "background task stopped"),
            Err(e) => error!(task = name, "background task stopped with error: {:?}", e),
        }
    });
}
