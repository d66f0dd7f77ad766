//! Timers: the delays between attempts
//!
//! A timer runs once per retry cycle, after the limiter has agreed to another
//! attempt and before that attempt starts. Cancelable timers race their delay
//! against a [`CancellationSignal`] and return early when it fires; they do
//! not report which side won. The loop learns about cancellation from a
//! cancelable limiter on the next cycle.
//!
//! Backoff timers keep their current delay as private state, so the retry
//! loop takes its timer by value like it does its limiter.

use std::future::Future;
use std::time::Duration;

use crate::cancel::CancellationSignal;

/// Waits between a failed attempt and the next one
///
/// Any `FnMut() -> Fut` closure returning a `Send` future is a timer.
pub trait Timer {
    /// Wait before the next attempt
    fn wait(&mut self) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> Timer for F
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send,
{
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        self()
    }
}

/// Sleep until `duration` elapses or `signal` is canceled, whichever is first
async fn sleep_or_cancel<S: CancellationSignal>(signal: &S, duration: Duration) {
    let delay = tokio::time::sleep(duration);

    // The branch that loses is dropped by `select!`, which deregisters a
    // pending sleep from the timer wheel.
    tokio::select! {
        biased;

        () = signal.canceled() => {
            tracing::trace!(
                delay_ms = duration.as_millis() as u64,
                "retry delay cut short by cancellation"
            );
        }
        () = delay => {}
    }
}

/// Double `current` unless it already sits at `ceiling`, clamping to `ceiling`
fn escalate(current: Duration, ceiling: Duration) -> Duration {
    if current == ceiling {
        return current;
    }
    match current.checked_mul(2) {
        Some(next) if next <= ceiling => next,
        _ => ceiling,
    }
}

/// Sleeps for a fixed duration; cannot be interrupted
#[derive(Debug, Clone, Copy)]
pub struct Sleep {
    duration: Duration,
}

impl Sleep {
    /// Create a fixed-duration timer
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The duration of every wait
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Timer for Sleep {
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(self.duration)
    }
}

/// Sleeps for a fixed duration unless the signal is canceled first
#[derive(Debug, Clone)]
pub struct CancelableSleep<S> {
    signal: S,
    duration: Duration,
}

impl<S> CancelableSleep<S> {
    /// Create a fixed-duration timer that `signal` can cut short
    pub fn new(signal: S, duration: Duration) -> Self {
        Self { signal, duration }
    }

    /// The duration of every uninterrupted wait
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl<S: CancellationSignal> Timer for CancelableSleep<S> {
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        sleep_or_cancel(&self.signal, self.duration)
    }
}

/// Sleeps for a delay that doubles after every call, up to a ceiling
///
/// The first call sleeps for `base`. Doubling happens after the sleep and
/// only affects later calls; once the delay reaches `ceiling` it stays there.
///
/// # Example
///
/// ```rust
/// use persevere::timer::MultiplicativeBackoff;
/// use std::time::Duration;
///
/// let backoff = MultiplicativeBackoff::new(Duration::from_secs(1), Duration::from_secs(4));
/// assert_eq!(backoff.current(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct MultiplicativeBackoff {
    current: Duration,
    ceiling: Duration,
}

impl MultiplicativeBackoff {
    /// Create a backoff timer starting at `base`, capped at `ceiling`
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            current: base,
            ceiling,
        }
    }

    /// The delay the next call will sleep for
    pub fn current(&self) -> Duration {
        self.current
    }

    /// The delay cap
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    fn escalate(&mut self) {
        self.current = escalate(self.current, self.ceiling);
    }
}

impl Timer for MultiplicativeBackoff {
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            tokio::time::sleep(self.current).await;
            self.escalate();
        }
    }
}

/// A [`MultiplicativeBackoff`] whose sleeps the signal can cut short
///
/// The delay escalates after every call, whether or not the sleep was
/// interrupted.
#[derive(Debug, Clone)]
pub struct CancelableMultiplicativeBackoff<S> {
    signal: S,
    backoff: MultiplicativeBackoff,
}

impl<S> CancelableMultiplicativeBackoff<S> {
    /// Create a cancelable backoff timer starting at `base`, capped at `ceiling`
    pub fn new(signal: S, base: Duration, ceiling: Duration) -> Self {
        Self {
            signal,
            backoff: MultiplicativeBackoff::new(base, ceiling),
        }
    }

    /// The delay the next call will sleep for
    pub fn current(&self) -> Duration {
        self.backoff.current()
    }

    /// The delay cap
    pub fn ceiling(&self) -> Duration {
        self.backoff.ceiling()
    }
}

impl<S: CancellationSignal> Timer for CancelableMultiplicativeBackoff<S> {
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            sleep_or_cancel(&self.signal, self.backoff.current()).await;
            self.backoff.escalate();
        }
    }
}

/// A timer sleeping `duration` between attempts
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

/// A timer sleeping `duration` between attempts unless `signal` is canceled
pub fn cancelable_sleep<S>(signal: S, duration: Duration) -> CancelableSleep<S> {
    CancelableSleep::new(signal, duration)
}

/// A timer doubling its delay from `base` up to `ceiling`
pub fn multiplicative_backoff(base: Duration, ceiling: Duration) -> MultiplicativeBackoff {
    MultiplicativeBackoff::new(base, ceiling)
}

/// A timer doubling its delay from `base` up to `ceiling`, cut short by `signal`
pub fn cancelable_multiplicative_backoff<S>(
    signal: S,
    base: Duration,
    ceiling: Duration,
) -> CancelableMultiplicativeBackoff<S> {
    CancelableMultiplicativeBackoff::new(signal, base, ceiling)
}

/// Short name for [`cancelable_multiplicative_backoff`]
pub use self::cancelable_multiplicative_backoff as cmb;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    const SEC: Duration = Duration::from_secs(1);

    /// Paused-clock sleeps can overshoot by the timer wheel's 1ms resolution
    fn assert_waited(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "waited {elapsed:?}, expected {expected:?}"
        );
    }

    #[test]
    fn test_escalate_doubles_and_clamps() {
        let ceiling = 4 * SEC;
        assert_eq!(escalate(SEC, ceiling), 2 * SEC);
        assert_eq!(escalate(2 * SEC, ceiling), 4 * SEC);
        assert_eq!(escalate(3 * SEC, ceiling), 4 * SEC);
        assert_eq!(escalate(4 * SEC, ceiling), 4 * SEC);
    }

    #[test]
    fn test_escalate_base_above_ceiling_drops_to_ceiling() {
        assert_eq!(escalate(10 * SEC, 4 * SEC), 4 * SEC);
    }

    #[test]
    fn test_escalate_overflow_clamps() {
        assert_eq!(escalate(Duration::MAX, Duration::MAX), Duration::MAX);
        let huge = Duration::MAX / 2 + SEC;
        assert_eq!(escalate(huge, Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_constructors_are_inert() {
        let backoff = multiplicative_backoff(SEC, 4 * SEC);
        assert_eq!(backoff.current(), SEC);
        assert_eq!(backoff.ceiling(), 4 * SEC);
        assert_eq!(sleep(SEC).duration(), SEC);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_waits_full_duration() {
        let mut timer = sleep(3 * SEC);
        let start = Instant::now();
        timer.wait().await;
        assert_waited(start.elapsed(), 3 * SEC);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence() {
        let mut timer = multiplicative_backoff(SEC, 4 * SEC);
        let expected: [u32; 5] = [1, 2, 4, 4, 4];

        for secs in expected {
            assert_eq!(timer.current(), secs * SEC);
            let start = Instant::now();
            timer.wait().await;
            assert_waited(start.elapsed(), secs * SEC);
        }
        assert_eq!(timer.current(), 4 * SEC);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_sleep_runs_full_duration_without_cancel() {
        let token = CancellationToken::new();
        let mut timer = cancelable_sleep(token, 2 * SEC);

        let start = Instant::now();
        timer.wait().await;
        assert_waited(start.elapsed(), 2 * SEC);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_sleep_returns_early_on_cancel() {
        let token = CancellationToken::new();
        let mut timer = cancelable_sleep(token.clone(), Duration::from_secs(3600));

        let canceler = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let start = Instant::now();
        timer.wait().await;
        let elapsed = start.elapsed();

        canceler.await.unwrap();
        assert!(elapsed < SEC, "wait was not cut short: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_sleep_pre_canceled_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let mut timer = cancelable_sleep(&token, Duration::from_secs(3600));

        let start = Instant::now();
        timer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cmb_escalates_even_when_canceled() {
        let token = CancellationToken::new();
        token.cancel();
        let mut timer = cmb(token, SEC, 4 * SEC);

        for secs in [1u32, 2, 4, 4] {
            assert_eq!(timer.current(), secs * SEC);
            let start = Instant::now();
            timer.wait().await;
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_backoff_sequence_without_cancel() {
        let token = CancellationToken::new();
        let mut timer = cancelable_multiplicative_backoff(token, SEC, 4 * SEC);

        for secs in [1u32, 2, 4, 4] {
            let start = Instant::now();
            timer.wait().await;
            assert_waited(start.elapsed(), secs * SEC);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_backoff_interrupted_mid_sleep() {
        let token = CancellationToken::new();
        let mut timer = cmb(token.clone(), 8 * SEC, 60 * SEC);

        let canceler = tokio::spawn(async move {
            tokio::time::sleep(SEC).await;
            token.cancel();
        });

        let start = Instant::now();
        timer.wait().await;
        let elapsed = start.elapsed();
        canceler.await.unwrap();

        assert!(elapsed < 8 * SEC, "wait was not cut short: {elapsed:?}");
        assert_eq!(timer.current(), 16 * SEC);
    }

    #[tokio::test]
    async fn test_closure_timer() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut timer = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        };

        timer.wait().await;
        timer.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
