//! Bounded retry for transactions that lose a race against the live cluster.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an attempt failed and another one will follow.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Callback that reports retries through the `log` facade.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "try {}/{} failed: {}. Retrying in {:.1}s",
            attempt,
            max_attempts,
            error.summary(),
            delay.as_secs_f64()
        );
        log::debug!("full error: {error}");
    }
}

/// Prefix for log lines of a retried operation, empty for single attempts.
pub fn try_text(attempt: u32, max_attempts: u32) -> String {
    if max_attempts > 1 {
        format!("try {}/{}: ", attempt + 1, max_attempts)
    } else {
        String::new()
    }
}

/// Execute an operation with retry logic.
///
/// The operation receives the 0-indexed attempt number. Non-retryable errors
/// are returned immediately. When every attempt fails, the last error is
/// wrapped in [`Error::RetriesExhausted`] carrying its first output line.
///
/// # Arguments
/// * `label` - Command description for the exhaustion error
/// * `config` - Retry configuration
/// * `callback` - Optional callback for retry notifications
/// * `operation` - The operation to execute
pub fn with_retry<T, F>(
    label: &str,
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = config.attempts();
    let mut last_error: Option<Error> = None;

    for attempt in 0..max_attempts {
        match operation(attempt) {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                if attempt + 1 >= max_attempts {
                    last_error = Some(e);
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, max_attempts, &e, delay);
                }
                if !delay.is_zero() {
                    thread::sleep(delay);
                }

                last_error = Some(e);
            }
        }
    }

    let last = last_error.unwrap_or_else(|| Error::Other("retry exhausted".to_string()));
    Err(Error::RetriesExhausted {
        command: label.to_string(),
        attempts: max_attempts,
        summary: last.summary(),
        source: Box::new(last),
    })
}

/// Sleep for the settle period after a successful push.
pub fn settle(config: &RetryConfig) {
    if !config.post_success_sleep.is_zero() {
        log::debug!(
            "sleeping {:.1}s after success",
            config.post_success_sleep.as_secs_f64()
        );
        thread::sleep(config.post_success_sleep);
    }
}
