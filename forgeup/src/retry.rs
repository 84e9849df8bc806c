//! Bounded retry with a fixed inter-attempt delay.
//!
//! Every stage (fetch, clone, install, relaunch) retries the same way: a
//! maximum number of attempts with a constant pause between them. There is
//! no exponential backoff and no jitter.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use forgeup::retry::{retry_until, RetryPolicy};
//!
//! let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
//! let outcome = retry_until(&policy, |attempt| clone_once(attempt), Result::is_ok).await;
//! if !outcome.succeeded {
//!     eprintln!("gave up after {} attempts", outcome.attempts);
//! }
//! ```

use std::future::Future;
use std::time::Duration;

/// How an operation handles transient failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// No retries - a single attempt.
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::None
    }
}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    ///
    /// A `max_attempts` of zero is treated as a single attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Returns the delay to wait after the given (1-based) attempt failed,
    /// or `None` when no further attempt is allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
        }
    }

    /// Returns the pause between attempts (zero for [`RetryPolicy::None`]).
    pub fn delay(&self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay, .. } => *delay,
        }
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
        }
    }
}

/// Result of running an action under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Value produced by the last attempt.
    pub value: T,
    /// Number of attempts made.
    pub attempts: u32,
    /// Whether the last attempt satisfied the success predicate.
    pub succeeded: bool,
}

/// Runs `action` until `is_success` accepts its output or the policy is
/// exhausted.
///
/// The action receives the 1-based attempt number. Cleanup between attempts
/// (removing a partial clone, deleting a temporary file) belongs inside the
/// action itself.
pub async fn retry_until<T, F, Fut, P>(
    policy: &RetryPolicy,
    mut action: F,
    is_success: P,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 1;
    loop {
        let value = action(attempt).await;
        if is_success(&value) {
            return RetryOutcome {
                value,
                attempts: attempt,
                succeeded: true,
            };
        }

        match policy.delay_for_attempt(attempt) {
            Some(delay) => {
                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying after fixed delay"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => {
                return RetryOutcome {
                    value,
                    attempts: attempt,
                    succeeded: false,
                }
            }
        }
    }
}
