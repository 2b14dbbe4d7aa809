/// Timeout wrapper for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
#[error("Operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run a future, giving up once `duration` has passed
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| Elapsed(duration))
}

/// Sleep for `delay` unless `cancel` completes first
///
/// Returns `true` if the full delay elapsed, `false` if it was cut short.
pub async fn sleep_unless<C>(delay: Duration, cancel: C) -> bool
where
    C: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel => false,
    }
}
