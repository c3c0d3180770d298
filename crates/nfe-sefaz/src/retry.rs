//! Retry with exponential backoff for authority calls.
//!
//! Only failures classified as retryable by
//! [`TransportError::is_retryable`] are retried. TLS rejections, 4xx
//! answers, SOAP faults and unreadable bodies are returned at once.

use std::future::Future;
use std::time::Duration;

use crate::endpoint::Service;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

/// Longest single pause between attempts.
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Delay before retry number `attempt + 1`, doubling from `base_delay` and
/// capped at [`MAX_BACKOFF`].
pub(crate) fn backoff(policy: RetryPolicy, attempt: u32) -> Duration {
    policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

/// Run `f` up to `max_retries + 1` times. Delays double from `base_delay`:
/// 200ms, 400ms, 800ms with the defaults.
pub(crate) async fn retry_send<T, F, Fut>(
    policy: RetryPolicy,
    service: Service,
    f: F,
) -> Result<T, TransportError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0u32;
    loop {
        metrics::counter!("nfe_transport_attempts_total", "operation" => service.as_str())
            .increment(1);
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = backoff(policy, attempt);
                attempt += 1;
                tracing::warn!(
                    operation = service.as_str(),
                    attempt,
                    max_retries = policy.max_retries,
                    error_kind = e.kind(),
                    "authority call failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
