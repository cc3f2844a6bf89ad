// SPDX-License-Identifier: AGPL-3.0-or-later
//! Exponential backoff with jitter for backend calls

use chanfs_core::{ChanfsError, ChanfsResult, RetrySettings};
use std::future::Future;
use std::time::Duration;

/// Retries a backend call while it fails with a retryable error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

/// The call gave up, either on a fatal error or with attempts exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryError {
    pub attempts: u32,
    pub last: ChanfsError,
}

impl RetryError {
    pub fn into_transfer_failed(self, what: impl Into<String>) -> ChanfsError {
        ChanfsError::TransferFailed {
            what: what.into(),
            attempts: self.attempts,
            reason: self.last.to_string(),
        }
    }

    pub fn into_persistence_failed(self, action: &str) -> ChanfsError {
        ChanfsError::PersistenceFailed(format!(
            "{action} failed after {} attempt(s): {}",
            self.attempts, self.last
        ))
    }
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// `salt` spreads the jitter of concurrent callers apart. A rate limit
    /// hint raises the delay to at least the requested wait, still bounded
    /// by `max_backoff_ms`.
    pub fn delay_for(&self, attempt: u32, salt: &str, error: &ChanfsError) -> Duration {
        let s = &self.settings;
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base = (s.initial_backoff_ms as f64 * s.backoff_multiplier.powi(exponent))
            .min(s.max_backoff_ms as f64);

        let jittered = base * (1.0 - s.jitter * jitter_fraction(salt, attempt));
        let mut millis = jittered.max(0.0) as u64;

        if let Some(secs) = error.retry_after_secs() {
            millis = millis.max(secs.saturating_mul(1000));
        }
        Duration::from_millis(millis.min(s.max_backoff_ms))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChanfsResult<T>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt, what, &e);
                    tracing::warn!(
                        what,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend call failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    return Err(RetryError {
                        attempts: attempt,
                        last: e,
                    })
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetrySettings::default())
    }
}

/// Deterministic value in `0.0..1.0` derived from the salt and attempt.
fn jitter_fraction(salt: &str, attempt: u32) -> f64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(&attempt.to_le_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(word) >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings(jitter: f64) -> RetrySettings {
        RetrySettings {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(settings(0.0));
        let err = ChanfsError::Timeout;
        assert_eq!(policy.delay_for(1, "x", &err), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, "x", &err), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, "x", &err), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5, "x", &err), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(60, "x", &err), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(settings(0.5));
        for attempt in 1..=4 {
            for salt in ["a", "b", "chunk 7"] {
                let delay = policy.delay_for(attempt, salt, &ChanfsError::Timeout);
                let base = (100u64 << (attempt - 1)).min(1_000);
                assert!(delay <= Duration::from_millis(base));
                assert!(delay >= Duration::from_millis(base / 2));
            }
        }
    }

    #[test]
    fn test_rate_limit_hint_is_a_floor() {
        let policy = RetryPolicy::new(settings(0.0));
        let err = ChanfsError::RateLimited {
            retry_after_secs: Some(1),
        };
        assert_eq!(policy.delay_for(1, "x", &err), Duration::from_millis(1_000));

        let err = ChanfsError::RateLimited {
            retry_after_secs: Some(60),
        };
        assert_eq!(policy.delay_for(1, "x", &err), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(RetrySettings::immediate(3));
        let calls = &AtomicU32::new(0);
        let result = policy
            .run("op", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ChanfsError::Network("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let policy = RetryPolicy::new(RetrySettings::immediate(4));
        let err = policy
            .run("op", || async { Err::<(), _>(ChanfsError::Timeout) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last, ChanfsError::Timeout);

        let failed = err.into_transfer_failed("chunk 0");
        assert!(matches!(failed, ChanfsError::TransferFailed { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let policy = RetryPolicy::new(RetrySettings::immediate(5));
        let calls = &AtomicU32::new(0);
        let err = policy
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ChanfsError::Backend {
                    backend: "b".into(),
                    message: "gone".into(),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
