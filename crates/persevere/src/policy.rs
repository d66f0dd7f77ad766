//! Declarative retry policies
//!
//! A [`RetryPolicy`] describes a limiter and a timer in data, so they can be
//! kept in configuration files. Every call to [`RetryPolicy::limiter`] or
//! [`RetryPolicy::timer`] builds a fresh instance for one retry loop.
//!
//! ```yaml
//! default:
//!   limit:
//!     kind: counts
//!     max-attempts: 3
//!   delay:
//!     kind: backoff
//!     initial-delay-ms: 1000
//!     max-delay-ms: 30000
//! operations:
//!   heartbeat:
//!     limit:
//!       kind: forever
//!     delay:
//!       kind: sleep
//!       delay-ms: 5000
//! ```

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationSignal;
use crate::error::{Error, Result};
use crate::limiter::{Cancelable, Counts, Forever, Limiter, Once};
use crate::timer::{
    CancelableMultiplicativeBackoff, CancelableSleep, MultiplicativeBackoff, Sleep, Timer,
};

/// When to stop retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum LimitPolicy {
    /// Single attempt, no retries
    Once,

    /// Retry until canceled
    Forever,

    /// Stop after a number of attempts, the first included
    Counts {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
}

impl Default for LimitPolicy {
    fn default() -> Self {
        LimitPolicy::Counts {
            max_attempts: default_max_attempts(),
        }
    }
}

/// How long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum DelayPolicy {
    /// Fixed delay
    Sleep {
        #[serde(default = "default_initial_delay")]
        delay_ms: u64,
    },

    /// Delay doubling from `initial_delay_ms` up to `max_delay_ms` (default)
    Backoff {
        #[serde(default = "default_initial_delay")]
        initial_delay_ms: u64,
        #[serde(default = "default_max_delay")]
        max_delay_ms: u64,
    },
}

impl Default for DelayPolicy {
    fn default() -> Self {
        DelayPolicy::Backoff {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}

/// Retry policy for an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Stop condition
    #[serde(default)]
    pub limit: LimitPolicy,

    /// Delay between attempts
    #[serde(default)]
    pub delay: DelayPolicy,
}

impl RetryPolicy {
    /// Create a policy from its parts
    pub fn new(limit: LimitPolicy, delay: DelayPolicy) -> Self {
        Self { limit, delay }
    }

    /// Check that the policy describes a limiter and timer that make sense
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(Error::invalid_policy)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if let LimitPolicy::Counts { max_attempts: 0 } = self.limit {
            return Err("max-attempts must be at least 1 (the first attempt always runs)".into());
        }
        if let DelayPolicy::Backoff {
            initial_delay_ms,
            max_delay_ms,
        } = self.delay
        {
            if initial_delay_ms == 0 {
                return Err("initial-delay-ms must be positive for backoff".into());
            }
            if initial_delay_ms > max_delay_ms {
                return Err(format!(
                    "initial-delay-ms ({initial_delay_ms}) exceeds max-delay-ms ({max_delay_ms})"
                ));
            }
        }
        Ok(())
    }

    /// Build a fresh limiter for one retry loop
    pub fn limiter(&self) -> PolicyLimiter {
        match self.limit {
            LimitPolicy::Once => PolicyLimiter::Once(Once),
            LimitPolicy::Forever => PolicyLimiter::Forever(Forever),
            LimitPolicy::Counts { max_attempts } => PolicyLimiter::Counts(Counts::new(max_attempts)),
        }
    }

    /// Build a fresh limiter that also stops once `signal` is canceled
    pub fn cancelable_limiter<S>(&self, signal: S) -> Cancelable<S, PolicyLimiter> {
        Cancelable::new(signal, self.limiter())
    }

    /// Build a fresh timer for one retry loop
    pub fn timer(&self) -> PolicyTimer {
        match self.delay {
            DelayPolicy::Sleep { delay_ms } => {
                PolicyTimer::Sleep(Sleep::new(Duration::from_millis(delay_ms)))
            }
            DelayPolicy::Backoff {
                initial_delay_ms,
                max_delay_ms,
            } => PolicyTimer::Backoff(MultiplicativeBackoff::new(
                Duration::from_millis(initial_delay_ms),
                Duration::from_millis(max_delay_ms),
            )),
        }
    }

    /// Build a fresh timer whose waits `signal` can cut short
    pub fn cancelable_timer<S>(&self, signal: S) -> CancelablePolicyTimer<S> {
        match self.delay {
            DelayPolicy::Sleep { delay_ms } => CancelablePolicyTimer::Sleep(CancelableSleep::new(
                signal,
                Duration::from_millis(delay_ms),
            )),
            DelayPolicy::Backoff {
                initial_delay_ms,
                max_delay_ms,
            } => CancelablePolicyTimer::Backoff(CancelableMultiplicativeBackoff::new(
                signal,
                Duration::from_millis(initial_delay_ms),
                Duration::from_millis(max_delay_ms),
            )),
        }
    }
}

/// Limiter built from a [`LimitPolicy`]
#[derive(Debug, Clone)]
pub enum PolicyLimiter {
    Once(Once),
    Forever(Forever),
    Counts(Counts),
}

impl<E: ?Sized> Limiter<E> for PolicyLimiter {
    fn should_retry(&mut self, error: &E) -> bool {
        match self {
            PolicyLimiter::Once(l) => l.should_retry(error),
            PolicyLimiter::Forever(l) => l.should_retry(error),
            PolicyLimiter::Counts(l) => l.should_retry(error),
        }
    }
}

/// Timer built from a [`DelayPolicy`]
#[derive(Debug, Clone)]
pub enum PolicyTimer {
    Sleep(Sleep),
    Backoff(MultiplicativeBackoff),
}

impl Timer for PolicyTimer {
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            match self {
                PolicyTimer::Sleep(t) => t.wait().await,
                PolicyTimer::Backoff(t) => t.wait().await,
            }
        }
    }
}

/// Cancelable timer built from a [`DelayPolicy`]
#[derive(Debug, Clone)]
pub enum CancelablePolicyTimer<S> {
    Sleep(CancelableSleep<S>),
    Backoff(CancelableMultiplicativeBackoff<S>),
}

impl<S: CancellationSignal> Timer for CancelablePolicyTimer<S> {
    fn wait(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            match self {
                CancelablePolicyTimer::Sleep(t) => t.wait().await,
                CancelablePolicyTimer::Backoff(t) => t.wait().await,
            }
        }
    }
}

/// Retry policies keyed by operation name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicies {
    /// Policy for operations without their own entry
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation policies
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryPolicies {
    /// Load and validate policies from a YAML file
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;
        let policies = Self::from_yaml(&content)?;
        tracing::debug!(
            path = %path,
            operations = policies.operations.len(),
            "loaded retry policies"
        );
        Ok(policies)
    }

    /// Parse and validate policies from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let policies: Self = serde_yaml_ng::from_str(content)?;
        policies.validate()?;
        Ok(policies)
    }

    /// Validate the default policy and every operation policy
    pub fn validate(&self) -> Result<()> {
        self.default
            .check()
            .map_err(|message| Error::invalid_policy(format!("default: {message}")))?;

        let mut names: Vec<&String> = self.operations.keys().collect();
        names.sort();
        for name in names {
            self.operations[name]
                .check()
                .map_err(|message| Error::invalid_policy(format!("operation '{name}': {message}")))?;
        }
        Ok(())
    }

    /// The policy for `operation`, falling back to the default
    pub fn for_operation(&self, operation: &str) -> &RetryPolicy {
        self.operations.get(operation).unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.limit, LimitPolicy::Counts { max_attempts: 3 });
        assert_eq!(
            policy.delay,
            DelayPolicy::Backoff {
                initial_delay_ms: 1000,
                max_delay_ms: 30000,
            }
        );
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_parse_kebab_case_yaml() {
        let yaml = r#"
limit:
  kind: counts
  max-attempts: 5
delay:
  kind: sleep
  delay-ms: 250
"#;
        let policy: RetryPolicy = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(policy.limit, LimitPolicy::Counts { max_attempts: 5 });
        assert_eq!(policy.delay, DelayPolicy::Sleep { delay_ms: 250 });
    }

    #[test]
    fn test_parse_missing_fields_use_defaults() {
        let policy: RetryPolicy = serde_yaml_ng::from_str("limit:\n  kind: counts\n").unwrap();
        assert_eq!(policy.limit, LimitPolicy::Counts { max_attempts: 3 });
        assert_eq!(policy.delay, DelayPolicy::default());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = RetryPolicy::new(
            LimitPolicy::Counts { max_attempts: 0 },
            DelayPolicy::default(),
        );
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("max-attempts"));
    }

    #[test]
    fn test_validate_rejects_bad_backoff() {
        let zero = RetryPolicy::new(
            LimitPolicy::Once,
            DelayPolicy::Backoff {
                initial_delay_ms: 0,
                max_delay_ms: 100,
            },
        );
        assert!(matches!(zero.validate(), Err(Error::InvalidPolicy { .. })));

        let inverted = RetryPolicy::new(
            LimitPolicy::Once,
            DelayPolicy::Backoff {
                initial_delay_ms: 500,
                max_delay_ms: 100,
            },
        );
        let err = inverted.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max-delay-ms"));
    }

    #[test]
    fn test_limiter_from_policy() {
        let error = io::Error::other("fail");

        let mut once = RetryPolicy::new(LimitPolicy::Once, DelayPolicy::default()).limiter();
        assert!(!once.should_retry(&error));

        let mut forever = RetryPolicy::new(LimitPolicy::Forever, DelayPolicy::default()).limiter();
        assert!(forever.should_retry(&error));

        let policy = RetryPolicy::new(
            LimitPolicy::Counts { max_attempts: 2 },
            DelayPolicy::default(),
        );
        let mut first = policy.limiter();
        assert!(first.should_retry(&error));
        assert!(!first.should_retry(&error));

        // Each call yields an independent instance
        let mut second = policy.limiter();
        assert!(second.should_retry(&error));
    }

    #[test]
    fn test_timer_from_policy() {
        let sleep = RetryPolicy::new(LimitPolicy::Once, DelayPolicy::Sleep { delay_ms: 40 });
        assert!(matches!(sleep.timer(), PolicyTimer::Sleep(t) if t.duration() == Duration::from_millis(40)));

        match RetryPolicy::default().timer() {
            PolicyTimer::Backoff(t) => {
                assert_eq!(t.current(), Duration::from_millis(1000));
                assert_eq!(t.ceiling(), Duration::from_millis(30000));
            }
            other => panic!("expected backoff timer, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_timer_escalates() {
        let mut timer = RetryPolicy::new(
            LimitPolicy::Once,
            DelayPolicy::Backoff {
                initial_delay_ms: 10,
                max_delay_ms: 25,
            },
        )
        .timer();

        let mut seen = Vec::new();
        for _ in 0..4 {
            if let PolicyTimer::Backoff(t) = &timer {
                seen.push(t.current().as_millis());
            }
            timer.wait().await;
        }
        assert_eq!(seen, vec![10, 20, 25, 25]);
    }

    #[test]
    fn test_for_operation_falls_back_to_default() {
        let mut policies = RetryPolicies::default();
        let heartbeat = RetryPolicy::new(LimitPolicy::Forever, DelayPolicy::Sleep { delay_ms: 5 });
        policies
            .operations
            .insert("heartbeat".to_string(), heartbeat);

        assert_eq!(policies.for_operation("heartbeat"), &heartbeat);
        assert_eq!(policies.for_operation("upload"), &RetryPolicy::default());
    }

    #[test]
    fn test_validate_names_offending_operation() {
        let yaml = r#"
operations:
  upload:
    limit:
      kind: counts
      max-attempts: 0
"#;
        let err = RetryPolicies::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("operation 'upload'"));
    }
}
