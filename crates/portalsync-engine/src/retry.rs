//! Fixed-delay retry for idempotent remote operations.
//!
//! Every portal call and artifact build goes through [`RetryPolicy::execute`].
//! The policy blocks the calling thread between attempts, so it is only used
//! from blocking contexts (publish flows run under `spawn_blocking`).

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 60;

/// Error returned once every attempt has failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("{operation} failed after {attempts} attempt(s): {source:#}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl RetryError {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::ExhaustedRetries { attempts, .. } => *attempts,
        }
    }
}

/// Bounded attempts with a constant delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// A `max_attempts` of zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Invoke `op` until it succeeds or `max_attempts` is reached.
    ///
    /// Returns the first successful value. No delay follows the final failure.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::ExhaustedRetries`] carrying the last failure.
    pub fn execute<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let err: anyhow::Error = err.into();
                    if attempt >= max_attempts {
                        tracing::error!(
                            operation,
                            attempts = attempt,
                            error = format!("{err:#}"),
                            "Operation failed, retries exhausted"
                        );
                        return Err(RetryError::ExhaustedRetries {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_secs = self.delay.as_secs_f64(),
                        error = format!("{err:#}"),
                        "Operation failed, will retry"
                    );
                    std::thread::sleep(self.delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn first_success_is_returned_without_retry() {
        let calls = Cell::new(0);
        let value = fast(3)
            .execute("stage", || {
                calls.set(calls.get() + 1);
                Ok::<_, anyhow::Error>(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn transient_failure_then_success() {
        let calls = Cell::new(0);
        let value = fast(2)
            .execute("publish", || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(anyhow::anyhow!("503 service unavailable"))
                } else {
                    Ok("published")
                }
            })
            .unwrap();
        assert_eq!(value, "published");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn exhausted_retries_carry_last_error() {
        let calls = Cell::new(0);
        let err = fast(3)
            .execute("share", || {
                calls.set(calls.get() + 1);
                Err::<(), _>(anyhow::anyhow!("attempt {} refused", calls.get()))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(err.attempts(), 3);
        let msg = err.to_string();
        assert!(msg.contains("share"), "got: {msg}");
        assert!(msg.contains("attempt 3 refused"), "got: {msg}");
    }

    #[test]
    fn zero_attempts_means_one() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let _ = policy.execute("delete", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(anyhow::anyhow!("gone"))
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn default_policy_is_two_attempts_one_minute_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay, Duration::from_secs(60));
    }
}
