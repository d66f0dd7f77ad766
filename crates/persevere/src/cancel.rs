//! Cancellation signals observed by limiters and timers
//!
//! A signal is owned and driven by the caller. Persevere only looks at it:
//! either with a non-blocking check or by waiting for it to fire.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// An external cancellation source
///
/// # Example
///
/// ```rust
/// use persevere::CancellationSignal;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_canceled());
/// token.cancel();
/// assert!(token.is_canceled());
/// ```
pub trait CancellationSignal: Send + Sync {
    /// Non-blocking check for whether cancellation has occurred
    fn is_canceled(&self) -> bool;

    /// Resolves once cancellation occurs, immediately if it already has
    fn canceled(&self) -> impl Future<Output = ()> + Send;
}

impl CancellationSignal for CancellationToken {
    fn is_canceled(&self) -> bool {
        self.is_cancelled()
    }

    fn canceled(&self) -> impl Future<Output = ()> + Send {
        self.cancelled()
    }
}

impl<S: CancellationSignal> CancellationSignal for &S {
    fn is_canceled(&self) -> bool {
        (**self).is_canceled()
    }

    fn canceled(&self) -> impl Future<Output = ()> + Send {
        (**self).canceled()
    }
}

impl<S: CancellationSignal> CancellationSignal for Arc<S> {
    fn is_canceled(&self) -> bool {
        (**self).is_canceled()
    }

    fn canceled(&self) -> impl Future<Output = ()> + Send {
        (**self).canceled()
    }
}

/// A signal that cancels itself once a point in time is reached
///
/// Pairing a `Deadline` with the cancelable limiters and timers bounds the
/// total time a retry loop may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline at the given instant
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// A deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        let now = Instant::now();
        let at = now.checked_add(duration).unwrap_or_else(|| far_future(now));
        Self { at }
    }

    /// The instant at which this deadline fires
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline fires, zero once it has
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

impl CancellationSignal for Deadline {
    fn is_canceled(&self) -> bool {
        Instant::now() >= self.at
    }

    fn canceled(&self) -> impl Future<Output = ()> + Send {
        tokio::time::sleep_until(self.at)
    }
}

// Roughly 30 years, same horizon tokio uses for "never".
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}
