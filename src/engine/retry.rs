//! Exponential backoff for transient broker errors: base 1s, factor 2, cap
//! 30s, max 5 attempts. Permanent errors are never retried.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::domain::errors::BrokerError;

const BASE: Duration = Duration::from_secs(1);
const FACTOR: u32 = 2;
const CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BASE.saturating_mul(FACTOR.saturating_pow(attempt.saturating_sub(1)));
    scaled.min(CAP)
}

/// Retries `op` while it returns a transient `BrokerError`, sleeping between
/// attempts per `backoff_delay`. A permanent error or the final attempt's
/// error is returned as-is.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                warn!(attempt, ?delay, error = %err, "retrying transient broker error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_delay_doubles_then_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(6), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, BrokerError> = with_backoff(|| {
            let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(BrokerError::Transient("timeout".to_string()))
                } else {
                    Ok(count)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn never_retries_permanent_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, BrokerError> = with_backoff(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(BrokerError::Permanent("bad request".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
