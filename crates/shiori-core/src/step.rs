//! Step names, retry policy and per-step options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Type-safe step name wrapper.
///
/// The step name is the replay key: it must be unique within one execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&StepName> for StepName {
    fn from(s: &StepName) -> Self {
        s.clone()
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// In-process retry policy for a step's thunk.
///
/// Retries only wrap the thunk invocation of a step that is not in history.
/// A step that exhausts its retries is not recorded and runs again on the
/// next execution attempt.
///
/// # Examples
///
/// ```
/// use shiori_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(4, Duration::from_millis(50));
/// assert_eq!(policy.max_retries(), 4);
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Run the thunk once.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed {
        /// Maximum number of retries after the first attempt.
        max_retries: u32,
        /// Delay before each retry.
        delay: Duration,
    },
    /// Exponential backoff.
    ExponentialBackoff {
        /// Maximum number of retries after the first attempt.
        max_retries: u32,
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Upper bound for any single delay.
        max_delay: Duration,
        /// Growth factor per retry.
        multiplier: u32,
    },
}

/// Error returned when [`RetryPolicy`] parameters are invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid retry policy: {0}")]
pub struct RetryPolicyError(pub &'static str);

impl RetryPolicy {
    /// Retries up to `max_retries` times without waiting.
    pub fn immediate(max_retries: u32) -> Self {
        RetryPolicy::Fixed {
            max_retries,
            delay: Duration::ZERO,
        }
    }

    /// Retries up to `max_retries` times with a constant delay.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    /// Exponential backoff doubling from `initial_delay`, capped at 60s.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Exponential backoff with explicit cap and multiplier.
    ///
    /// # Errors
    ///
    /// Fails if `multiplier` is 0 or above 10, or if `max_delay < initial_delay`.
    pub fn exponential_backoff(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        if multiplier == 0 {
            return Err(RetryPolicyError("multiplier must be greater than 0"));
        }
        if multiplier > 10 {
            return Err(RetryPolicyError(
                "multiplier must be 10 or less to avoid overflow",
            ));
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError("max_delay must be >= initial_delay"));
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. }
            | RetryPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = u32::try_from((*multiplier as u64).saturating_pow(attempt))
                    .unwrap_or(u32::MAX);
                Some(initial_delay.saturating_mul(factor).min(*max_delay))
            }
        }
    }
}

/// Options accepted by a durable context's `step_with`.
///
/// The default runs the thunk once with no timeout.
///
/// # Examples
///
/// ```
/// use shiori_core::{RetryPolicy, StepOptions};
/// use std::time::Duration;
///
/// let options = StepOptions::new()
///     .retry(RetryPolicy::immediate(3))
///     .timeout(Duration::from_secs(5));
/// assert_eq!(options.retry_policy.max_retries(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOptions {
    /// Retry policy around the thunk.
    pub retry_policy: RetryPolicy,
    /// Bound on each thunk attempt. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl StepOptions {
    /// Options that run the thunk once, unbounded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Bounds each attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
