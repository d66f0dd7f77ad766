//! Limiters: the stop conditions of the retry loop
//!
//! A limiter is consulted once after every failed attempt and answers a single
//! question: should another attempt be made? It sees the failed attempt's
//! error, so callers can classify errors by implementing [`Limiter`] or by
//! passing a closure.
//!
//! Limiters may keep per-loop state (see [`Counts`]). The retry loop takes
//! its limiter by value, so each loop invocation gets its own instance.

use crate::cancel::CancellationSignal;
use crate::error::{Error, Result};

/// Decides whether a failed attempt should be followed by another
///
/// Any `FnMut(&E) -> bool` closure is a limiter.
///
/// # Example
///
/// ```rust
/// use persevere::Limiter;
/// use std::io::{Error, ErrorKind};
///
/// struct TransientOnly;
///
/// impl Limiter<Error> for TransientOnly {
///     fn should_retry(&mut self, error: &Error) -> bool {
///         matches!(error.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted)
///     }
/// }
/// ```
pub trait Limiter<E: ?Sized> {
    /// Return true to make another attempt, false to stop
    fn should_retry(&mut self, error: &E) -> bool;
}

impl<E: ?Sized, F> Limiter<E> for F
where
    F: FnMut(&E) -> bool,
{
    fn should_retry(&mut self, error: &E) -> bool {
        self(error)
    }
}

/// Stops after the first failure
#[derive(Debug, Clone, Copy, Default)]
pub struct Once;

impl<E: ?Sized> Limiter<E> for Once {
    fn should_retry(&mut self, _error: &E) -> bool {
        false
    }
}

/// Never stops; pair it with cancellation to end the loop
#[derive(Debug, Clone, Copy, Default)]
pub struct Forever;

impl<E: ?Sized> Limiter<E> for Forever {
    fn should_retry(&mut self, _error: &E) -> bool {
        true
    }
}

/// Stops once `max` attempts have been made
///
/// The first attempt, which always runs before any limiter is consulted,
/// counts toward `max`. A `max` of zero behaves like one: no retries.
#[derive(Debug, Clone)]
pub struct Counts {
    max: u32,
    attempts: u32,
}

impl Counts {
    /// Create a counting limiter, treating zero as one
    pub fn new(max: u32) -> Self {
        Self { max, attempts: 1 }
    }

    /// Create a counting limiter, rejecting zero
    pub fn try_new(max: u32) -> Result<Self> {
        if max == 0 {
            return Err(Error::invalid_policy(
                "max-attempts must be at least 1 (the first attempt always runs)",
            ));
        }
        Ok(Self::new(max))
    }

    /// Attempts accounted for so far, including the first
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The configured attempt bound
    pub fn max(&self) -> u32 {
        self.max
    }
}

impl<E: ?Sized> Limiter<E> for Counts {
    fn should_retry(&mut self, _error: &E) -> bool {
        if self.attempts < self.max {
            self.attempts += 1;
            true
        } else {
            false
        }
    }
}

/// Wraps a limiter so it also stops once a signal is canceled
///
/// The signal is checked first; once it has fired the inner limiter is no
/// longer consulted.
#[derive(Debug, Clone)]
pub struct Cancelable<S, L> {
    signal: S,
    inner: L,
}

impl<S, L> Cancelable<S, L> {
    /// Wrap `inner` with cancellation by `signal`
    pub fn new(signal: S, inner: L) -> Self {
        Self { signal, inner }
    }

    /// The wrapped limiter
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Unwrap into the signal and the wrapped limiter
    pub fn into_parts(self) -> (S, L) {
        (self.signal, self.inner)
    }
}

impl<E, S, L> Limiter<E> for Cancelable<S, L>
where
    E: ?Sized,
    S: CancellationSignal,
    L: Limiter<E>,
{
    fn should_retry(&mut self, error: &E) -> bool {
        if self.signal.is_canceled() {
            tracing::debug!("retry limiter canceled");
            return false;
        }
        self.inner.should_retry(error)
    }
}

/// A limiter that stops after the first failure
pub fn once() -> Once {
    Once
}

/// A limiter that never stops
pub fn forever() -> Forever {
    Forever
}

/// A limiter that stops after `max` attempts (zero is treated as one)
pub fn counts(max: u32) -> Counts {
    Counts::new(max)
}

/// Wrap a limiter so it stops once `signal` is canceled
pub fn cancelable<S, L>(signal: S, inner: L) -> Cancelable<S, L> {
    Cancelable::new(signal, inner)
}

/// A limiter that retries until `signal` is canceled
pub fn until_canceled<S>(signal: S) -> Cancelable<S, Forever> {
    Cancelable::new(signal, Forever)
}
