use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry an async operation with exponential backoff.
///
/// - `max_attempts`: Total attempts (including the first). Zero is treated as one.
/// - `base_delay`: Delay after first failure, doubled on each subsequent failure.
/// - `label`: Description for log messages.
/// - `f`: Produces a fresh future per attempt.
pub async fn retry_async<F, Fut, T, E>(
    max_attempts: u32,
    base_delay: Duration,
    label: &str,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt < max_attempts => {
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "{} failed, retrying",
                    label,
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
