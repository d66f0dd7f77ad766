//! # persevere
//!
//! A small retry loop whose behavior comes from three pluggable pieces:
//! - A [`Limiter`] deciding, after each failed attempt, whether to go again
//! - A [`Timer`] that waits between a failed attempt and the next one
//! - A [`CancellationSignal`] that either of the above can observe
//!
//! Declarative policies loaded from YAML live in [`policy`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use persevere::{limiter, retry, timer};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(token: CancellationToken) -> Result<(), std::io::Error> {
//!     retry(
//!         || async { Ok(()) },
//!         limiter::cancelable(token.clone(), limiter::counts(5)),
//!         timer::cmb(token, Duration::from_millis(100), Duration::from_secs(5)),
//!     )
//!     .await
//! }
//! ```

pub mod cancel;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod observer;
pub mod policy;
pub mod timer;

pub use cancel::{CancellationSignal, Deadline};
pub use error::{Error, Result};
pub use executor::{retry, RetryLoop};
pub use limiter::Limiter;
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use policy::{RetryPolicies, RetryPolicy};
pub use timer::Timer;
