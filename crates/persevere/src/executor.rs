//! The retry loop
//!
//! The loop makes one attempt unconditionally. After every failure it asks
//! the limiter whether to continue and, if so, waits on the timer before the
//! next attempt. It returns the first success or the error of the last
//! attempt, unchanged.

use std::future::Future;

use tokio::time::Instant;

use crate::limiter::Limiter;
use crate::observer::{NoOpObserver, RetryObserver};
use crate::timer::Timer;

/// Run `op` until it succeeds or `limiter` says to stop, waiting on `timer`
/// between attempts
///
/// The limiter and timer are consumed: any state they carry belongs to this
/// one loop.
///
/// # Example
///
/// ```rust,no_run
/// use persevere::{limiter, retry, timer};
/// use std::time::Duration;
///
/// async fn example() -> Result<(), std::io::Error> {
///     retry(
///         || async { Ok(()) },
///         limiter::counts(3),
///         timer::multiplicative_backoff(Duration::from_millis(100), Duration::from_secs(2)),
///     )
///     .await
/// }
/// ```
pub async fn retry<F, Fut, T, E, L, D>(op: F, limiter: L, timer: D) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: Limiter<E>,
    D: Timer,
{
    RetryLoop::new(limiter, timer).run(op).await
}

/// A retry loop with an optional observer
///
/// # Example
///
/// ```rust,no_run
/// use persevere::{limiter, timer, RetryLoop, TracingObserver};
/// use std::time::Duration;
///
/// async fn example() -> Result<u32, std::io::Error> {
///     RetryLoop::new(limiter::counts(5), timer::sleep(Duration::from_millis(250)))
///         .with_observer(TracingObserver::new("read-sensor"))
///         .run(|| async { Ok(42) })
///         .await
/// }
/// ```
#[derive(Debug)]
pub struct RetryLoop<L, D, O = NoOpObserver> {
    limiter: L,
    timer: D,
    observer: O,
}

impl<L, D> RetryLoop<L, D, NoOpObserver> {
    /// Create a loop from a limiter and a timer
    pub fn new(limiter: L, timer: D) -> Self {
        Self {
            limiter,
            timer,
            observer: NoOpObserver,
        }
    }
}

impl<L, D, O> RetryLoop<L, D, O> {
    /// Set the observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryLoop<L, D, O2> {
        RetryLoop {
            limiter: self.limiter,
            timer: self.timer,
            observer,
        }
    }

    /// Run `op` to completion, consuming the loop
    pub async fn run<F, Fut, T, E>(mut self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        L: Limiter<E>,
        D: Timer,
        O: RetryObserver<E>,
    {
        let start = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            self.observer.on_attempt_start(attempt);

            let error = match op().await {
                Ok(value) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.limiter.should_retry(&error) {
                self.observer.on_stopped(attempt, &error);
                return Err(error);
            }
            self.observer.on_retry(attempt, &error);

            // Not held across the delay
            drop(error);

            self.timer.wait().await;
            attempt = attempt.saturating_add(1);
        }
    }
}
