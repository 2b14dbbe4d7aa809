/// Resilience helpers shared by the payment services
///
/// - **Backoff**: fixed or exponential delays with a cap and an optional retry
///   budget, for retrying transient broker failures
/// - **Timeout**: bounded waits on external calls, and cancellable sleeps
///
/// # Example: retrying a fetch with a bounded budget
///
/// ```rust,no_run
/// use resilience::{Backoff, BackoffConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let mut backoff = Backoff::new(
///         BackoffConfig::fixed(Duration::from_secs(1)).with_max_retries(Some(5)),
///     );
///
///     loop {
///         let attempt: Result<(), &str> = Err("broker down");
///         match attempt {
///             Ok(()) => break,
///             Err(_) => match backoff.next_delay() {
///                 Some(delay) => tokio::time::sleep(delay).await,
///                 None => break,
///             },
///         }
///     }
/// }
/// ```

pub mod backoff;
pub mod timeout;

pub use backoff::{Backoff, BackoffConfig};
pub use timeout::{sleep_unless, with_timeout, Elapsed};
