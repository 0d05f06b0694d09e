//! Outcome classification and bounded, jittered retry
//!
//! Every fetch attempt is reduced to one [`Outcome`]. The executor only ever
//! matches on that closed set; [`RetryPolicy`] decides whether another attempt
//! is allowed and how long to wait before it.
//!
//! # Example
//!
//! ```
//! use tweet_backfill::config::RetryConfig;
//! use tweet_backfill::retry::{IsRetryable, Outcome, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, RetryConfig::immediate());
//! let outcome = policy.classify::<Vec<u8>>(&Ok(Vec::new()), |items| items.len());
//! assert_eq!(outcome, Outcome::EmptyResult);
//! assert!(outcome.is_retryable());
//! assert!(policy.should_retry(2));
//! assert!(!policy.should_retry(3));
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FetchError};
use rand::Rng;
use std::time::Duration;

/// Trait for errors and outcomes that can be classified as retryable or not
///
/// Transient failures (timeouts, dropped connections, empty answers) return `true`.
pub trait IsRetryable {
    /// Returns true if the failure is transient and the target should be attempted again
    fn is_retryable(&self) -> bool;
}

/// Closed classification of one fetch attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Fetch returned data (or a profile)
    Success,
    /// Fetch returned nothing; may be a real gap or a silent failure
    EmptyResult,
    /// Timeout, dropped connection, or relay failure
    TransientNetwork,
    /// Fetch failed in a way the fetch side could not categorize
    Unknown,
    /// No relay was available; repopulate and try again without using an attempt
    QueueExhausted,
}

impl Outcome {
    /// Stable string form used in logs and relay bookkeeping
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::EmptyResult => "empty_result",
            Outcome::TransientNetwork => "transient_network",
            Outcome::Unknown => "unknown",
            Outcome::QueueExhausted => "queue_exhausted",
        }
    }

    /// Whether this outcome consumes one of the target's attempts
    pub fn counts_as_attempt(&self) -> bool {
        !matches!(self, Outcome::QueueExhausted)
    }

    /// Whether this outcome is a success for relay bookkeeping
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IsRetryable for Outcome {
    fn is_retryable(&self) -> bool {
        match self {
            Outcome::Success => false,
            // Empty answers are indistinguishable from silent failures
            Outcome::EmptyResult => true,
            Outcome::TransientNetwork => true,
            Outcome::Unknown => true,
            Outcome::QueueExhausted => true,
        }
    }
}

impl From<&FetchError> for Outcome {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::Timeout(_) | FetchError::Disconnected(_) | FetchError::Relay(_) => {
                Outcome::TransientNetwork
            }
            FetchError::Unknown(_) => Outcome::Unknown,
        }
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        Outcome::from(self).is_retryable()
    }
}

/// Implementation of IsRetryable for the crate error type
///
/// Crate errors come from persistence and configuration, never from the fetch
/// side, so none of them are retried at the target level.
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::RelayPoolExhausted => false,
            Error::Config { .. } => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Io(_) | Error::Serialization(_) | Error::Other(_) => false,
        }
    }
}

/// Attempt cap plus backoff for one session
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_fails: u32,
    backoff: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy allowing `max_fails` attempts per target
    pub fn new(max_fails: u32, backoff: RetryConfig) -> Self {
        Self { max_fails, backoff }
    }

    /// Maximum number of attempts per target
    pub fn max_fails(&self) -> u32 {
        self.max_fails
    }

    /// Reduce one fetch result to an [`Outcome`]
    ///
    /// `size` reports how many items a successful fetch carried; zero items is
    /// an [`Outcome::EmptyResult`].
    pub fn classify<T>(
        &self,
        result: &Result<T, FetchError>,
        size: impl FnOnce(&T) -> usize,
    ) -> Outcome {
        match result {
            Ok(value) if size(value) == 0 => Outcome::EmptyResult,
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::from(e),
        }
    }

    /// Whether another attempt is allowed after `attempts_made` failed ones
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_fails
    }

    /// Random delay before the next attempt, uniform in `[min_backoff, max_backoff]`
    pub fn backoff_delay(&self) -> Duration {
        add_jitter(self.backoff.min_backoff, self.backoff.max_backoff)
    }
}

/// Draw a delay uniformly from `[min, max]`
///
/// Workers that fail together spread their next attempts across the window
/// instead of hitting the relay queue in lockstep.
fn add_jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let secs = rng.gen_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_fails: u32) -> RetryPolicy {
        RetryPolicy::new(max_fails, RetryConfig::immediate())
    }

    #[test]
    fn classify_success_and_empty() {
        let p = policy(3);
        let full: Result<Vec<i32>, FetchError> = Ok(vec![1, 2]);
        let empty: Result<Vec<i32>, FetchError> = Ok(vec![]);
        assert_eq!(p.classify(&full, |v| v.len()), Outcome::Success);
        assert_eq!(p.classify(&empty, |v| v.len()), Outcome::EmptyResult);
    }

    #[test]
    fn classify_missing_profile_as_empty() {
        let p = policy(3);
        let missing: Result<Option<&str>, FetchError> = Ok(None);
        let present: Result<Option<&str>, FetchError> = Ok(Some("profile"));
        assert_eq!(
            p.classify(&missing, |v| usize::from(v.is_some())),
            Outcome::EmptyResult
        );
        assert_eq!(
            p.classify(&present, |v| usize::from(v.is_some())),
            Outcome::Success
        );
    }

    #[test]
    fn classify_fetch_errors() {
        let p = policy(3);
        let cases = [
            (FetchError::Timeout("t".into()), Outcome::TransientNetwork),
            (FetchError::Disconnected("d".into()), Outcome::TransientNetwork),
            (FetchError::Relay("r".into()), Outcome::TransientNetwork),
            (FetchError::Unknown("u".into()), Outcome::Unknown),
        ];
        for (err, expected) in cases {
            let result: Result<Vec<i32>, FetchError> = Err(err.clone());
            assert_eq!(p.classify(&result, |v| v.len()), expected, "for {err}");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn only_success_is_not_retryable() {
        assert!(!Outcome::Success.is_retryable());
        assert!(Outcome::EmptyResult.is_retryable());
        assert!(Outcome::TransientNetwork.is_retryable());
        assert!(Outcome::Unknown.is_retryable());
        assert!(Outcome::QueueExhausted.is_retryable());
    }

    #[test]
    fn queue_exhaustion_does_not_consume_an_attempt() {
        assert!(!Outcome::QueueExhausted.counts_as_attempt());
        assert!(Outcome::EmptyResult.counts_as_attempt());
        assert!(Outcome::Success.counts_as_attempt());
    }

    #[test]
    fn should_retry_caps_attempts() {
        let p = policy(3);
        assert!(p.should_retry(0));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
        assert!(!p.should_retry(4));
    }

    #[test]
    fn crate_errors_are_never_retried() {
        assert!(!Error::RelayPoolExhausted.is_retryable());
        assert!(!Error::Other("x".into()).is_retryable());
    }

    #[test]
    fn backoff_stays_within_bounds() {
        let p = RetryPolicy::new(
            3,
            RetryConfig {
                min_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(50),
            },
        );
        for _ in 0..200 {
            let d = p.backoff_delay();
            assert!(d >= Duration::from_millis(10), "too short: {:?}", d);
            assert!(d <= Duration::from_millis(50), "too long: {:?}", d);
        }
    }

    #[test]
    fn zero_backoff_is_immediate() {
        assert_eq!(policy(1).backoff_delay(), Duration::ZERO);
    }

    #[test]
    fn add_jitter_with_equal_bounds_returns_min() {
        let d = Duration::from_millis(75);
        assert_eq!(add_jitter(d, d), d);
    }
}
