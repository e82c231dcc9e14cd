//! Retry with exponential backoff for recoverable failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Implemented by error types that can distinguish transient failures
/// (worth retrying) from permanent ones.
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a configuration for quick retries (e.g., network operations)
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Create a configuration for slow retries (e.g., registration)
    pub fn slow() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 3.0,
            use_jitter: false,
        }
    }
}

/// Retry an operation with exponential backoff.
///
/// Retries only while the error reports itself recoverable and attempts
/// remain; a non-recoverable error returns immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> std::result::Result<T, E>
where
    E: Recoverable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    next_delay_ms = delay.as_millis() as u64,
                    "Recoverable error, will retry"
                );

                let actual_delay = if config.use_jitter {
                    let jitter = (rand::random::<f64>() - 0.5) * 0.2; // +-10% jitter
                    let millis = delay.as_millis() as f64;
                    Duration::from_millis((millis * (1.0 + jitter)) as u64)
                } else {
                    delay
                };

                sleep(actual_delay).await;

                let next_delay_ms = (delay.as_millis() as f64 * config.backoff_multiplier) as u64;
                delay = Duration::from_millis(next_delay_ms).min(config.max_delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                } else {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-recoverable error, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        recoverable: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error (recoverable: {})", self.recoverable)
        }
    }

    impl Recoverable for TestError {
        fn is_recoverable(&self) -> bool {
            self.recoverable
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_after_recoverable_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff("flaky", fast_config(), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError { recoverable: true })
            } else {
                Ok(42u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_recoverable_error_fails_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff("fatal", fast_config(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TestError { recoverable: false })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempt_cap_is_honored() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff("hopeless", fast_config(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TestError { recoverable: true })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
