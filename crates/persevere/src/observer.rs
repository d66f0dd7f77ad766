//! Retry observation and logging
//!
//! Observers are told about every step the retry loop takes. They never
//! influence control flow: the limiter alone decides whether to continue.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observer of retry loop events
///
/// The type parameter is the operation's error type. Observers that do not
/// look at errors can implement this for every `E`.
///
/// # Example
///
/// ```rust
/// use persevere::RetryObserver;
/// use std::time::Duration;
///
/// struct LastAttempt(std::cell::Cell<u32>);
///
/// impl<E: ?Sized> RetryObserver<E> for LastAttempt {
///     fn on_attempt_start(&self, attempt: u32) {
///         self.0.set(attempt);
///     }
///
///     fn on_retry(&self, _attempt: u32, _error: &E) {}
///
///     fn on_success(&self, _attempt: u32, _total_duration: Duration) {}
///
///     fn on_stopped(&self, _attempts: u32, _final_error: &E) {}
/// }
/// ```
pub trait RetryObserver<E: ?Sized> {
    /// Called before every attempt
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt number (1-indexed)
    fn on_attempt_start(&self, attempt: u32);

    /// Called when an attempt failed and the limiter allowed another one
    ///
    /// The timer runs right after this returns.
    fn on_retry(&self, attempt: u32, error: &E);

    /// Called when an attempt succeeds
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt number that succeeded (1-indexed)
    /// * `total_duration` - Time spent across all attempts and delays
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// Called when the limiter refused another attempt
    ///
    /// # Arguments
    ///
    /// * `attempts` - Total number of attempts made
    /// * `final_error` - The error the loop is about to return
    fn on_stopped(&self, attempts: u32, final_error: &E);
}

/// An observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl<E: ?Sized> RetryObserver<E> for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32) {}

    fn on_retry(&self, _attempt: u32, _error: &E) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_stopped(&self, _attempts: u32, _final_error: &E) {}
}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_retry`: WARN
/// - `on_success`: INFO (if > 1 attempt) or DEBUG (first attempt)
/// - `on_stopped`: ERROR
///
/// # Example
///
/// ```rust
/// use persevere::TracingObserver;
///
/// let observer = TracingObserver::new("fetch-manifest");
/// assert_eq!(observer.operation(), "fetch-manifest");
/// ```
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Name of the operation being retried (for log context)
    operation: String,
}

impl TracingObserver {
    /// Create a new tracing observer
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Get the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl<E: fmt::Display + ?Sized> RetryObserver<E> for TracingObserver {
    fn on_attempt_start(&self, attempt: u32) {
        tracing::debug!(
            operation = %self.operation,
            attempt = attempt,
            "starting attempt"
        );
    }

    fn on_retry(&self, attempt: u32, error: &E) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_stopped(&self, attempts: u32, final_error: &E) {
        tracing::error!(
            operation = %self.operation,
            attempts = attempts,
            error = %final_error,
            "giving up"
        );
    }
}

/// An observer that counts retry events
///
/// Useful for testing and metrics collection.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    retries: AtomicU32,
    successes: AtomicU32,
    stops: AtomicU32,
}

impl StatsObserver {
    /// Create a new stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts started
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Number of failures followed by another attempt
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Number of successes
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Number of times the limiter ended a loop
    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

impl<E: ?Sized> RetryObserver<E> for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry(&self, _attempt: u32, _error: &E) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stopped(&self, _attempts: u32, _final_error: &E) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl<E: ?Sized, T: RetryObserver<E> + ?Sized> RetryObserver<E> for Arc<T> {
    fn on_attempt_start(&self, attempt: u32) {
        (**self).on_attempt_start(attempt)
    }

    fn on_retry(&self, attempt: u32, error: &E) {
        (**self).on_retry(attempt, error)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_stopped(&self, attempts: u32, final_error: &E) {
        (**self).on_stopped(attempts, final_error)
    }
}

impl<E: ?Sized, T: RetryObserver<E> + ?Sized> RetryObserver<E> for Box<T> {
    fn on_attempt_start(&self, attempt: u32) {
        (**self).on_attempt_start(attempt)
    }

    fn on_retry(&self, attempt: u32, error: &E) {
        (**self).on_retry(attempt, error)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_stopped(&self, attempts: u32, final_error: &E) {
        (**self).on_stopped(attempts, final_error)
    }
}
