//! Call timeouts and cancellable backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::errors::{ProvisionError, TransientKind};

/// Run one backend call under `timeout`. An elapsed timeout is transient.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, ProvisionError>
where
    F: Future<Output = Result<T, ProvisionError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProvisionError::transient(
            TransientKind::Timeout,
            format!("call did not complete within {}ms", timeout.as_millis()),
        )),
    }
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Sleep for the backoff after `retries_used` retries.
///
/// Returns `false` if the token was cancelled first.
pub(crate) async fn backoff(
    policy: &RetryPolicy,
    retries_used: u32,
    cancel: &CancellationToken,
) -> bool {
    let delay = policy.delay_for(retries_used);
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_timeout_is_transient() {
        let err = with_timeout(Duration::from_secs(1), async {
            futures::future::pending::<Result<(), ProvisionError>>().await
        })
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("1000ms"));
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_backoff_returns_false() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!backoff(&RetryPolicy::default(), 0, &token).await);
    }
}
