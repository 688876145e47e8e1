//! Bounded retries with capped exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dfs_http_core::{Error, ErrorCode, Result};

use crate::client::ClientResponse;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on a single delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Decides whether an attempt is retried, given its response or its error.
/// Exactly one of the two is `Some`.
pub type RetryPredicate = Arc<dyn Fn(Option<&ClientResponse>, Option<&Error>) -> bool + Send + Sync>;

/// The default predicate: transport failures and `5xx` responses.
#[must_use]
pub fn network_error_or_server_error(response: Option<&ClientResponse>, error: Option<&Error>) -> bool {
    match (response, error) {
        (Some(response), _) => response.status().is_server_error(),
        (None, Some(error)) => error.is_code(ErrorCode::NetworkError),
        (None, None) => false,
    }
}

/// When and how long to wait before retrying a request.
///
/// Attempt `i` (zero-based) waits `min(base_interval * 2^(i-1), max_backoff)`
/// before it is sent; attempt 0 goes out immediately. By default a request
/// is retried on transport failures and on `5xx` responses;
/// [`with_should_retry`](Self::with_should_retry) swaps the predicate.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use dfs_http_client::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(25)).unwrap();
/// let delays: Vec<_> = policy.delays().collect();
/// assert_eq!(
///     delays,
///     [Duration::from_millis(10), Duration::from_millis(20), Duration::from_millis(25)]
/// );
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_interval: Duration,
    max_backoff: Duration,
    should_retry: RetryPredicate,
}

impl RetryPolicy {
    /// Creates a policy.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `base_interval` exceeds `max_backoff`.
    pub fn new(max_retries: u32, base_interval: Duration, max_backoff: Duration) -> Result<Self> {
        if base_interval > max_backoff {
            return Err(Error::invalid_argument("retry base interval exceeds max backoff")
                .with_field("base_interval_ms", duration_ms(base_interval))
                .with_field("max_backoff_ms", duration_ms(max_backoff)));
        }
        Ok(Self {
            max_retries,
            base_interval,
            max_backoff,
            should_retry: Arc::new(network_error_or_server_error),
        })
    }

    /// A policy that sends every request exactly once.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_interval: Duration::ZERO,
            max_backoff: Duration::ZERO,
            should_retry: Arc::new(network_error_or_server_error),
        }
    }

    /// Replaces the retry predicate.
    ///
    /// ```
    /// use dfs_http_client::RetryPolicy;
    ///
    /// // Also back off on 429.
    /// let policy = RetryPolicy::default().with_should_retry(|response, error| {
    ///     response.map_or(error.is_some(), |r| r.status().is_server_error() || r.status() == 429)
    /// });
    /// # let _ = policy;
    /// ```
    #[must_use]
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&ClientResponse>, Option<&Error>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Upper bound on any single delay.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Delay before attempt `attempt`. Zero for the first attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.base_interval
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// The delays before each retry, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|attempt| self.backoff(attempt))
    }

    /// Whether an attempt that ended with `outcome` should be retried.
    /// Attempt limits are not considered here.
    #[must_use]
    pub fn should_retry(&self, outcome: &Result<ClientResponse>) -> bool {
        match outcome {
            Ok(response) => (self.should_retry)(Some(response), None),
            Err(error) => (self.should_retry)(None, Some(error)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_interval: DEFAULT_BASE_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            should_retry: Arc::new(network_error_or_server_error),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_interval", &self.base_interval)
            .field("max_backoff", &self.max_backoff)
            .finish_non_exhaustive()
    }
}

/// Compares the timing parameters; predicates are not comparable.
impl PartialEq for RetryPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.max_retries == other.max_retries
            && self.base_interval == other.base_interval
            && self.max_backoff == other.max_backoff
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.base_interval(), Duration::from_millis(500));
        assert_eq!(policy.max_backoff(), Duration::from_secs(5));
        assert_eq!(
            policy.delays().collect::<Vec<_>>(),
            [Duration::from_millis(500), Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_base_above_cap_is_rejected() {
        let err = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(1)).unwrap_err();
        assert!(err.is_code(dfs_http_core::ErrorCode::InvalidArgument));
    }

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(RetryPolicy::default().backoff(0), Duration::ZERO);
        assert_eq!(RetryPolicy::none().delays().count(), 0);
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1), Duration::from_secs(30)).unwrap();
        assert_eq!(policy.backoff(64), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    fn ok(status: StatusCode) -> Result<ClientResponse> {
        Ok(ClientResponse::from_parts(status, ""))
    }

    #[test]
    fn test_default_predicate() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&Err(Error::network("connection refused"))));
        assert!(policy.should_retry(&ok(StatusCode::SERVICE_UNAVAILABLE)));
        assert!(policy.should_retry(&ok(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(!policy.should_retry(&ok(StatusCode::OK)));
        assert!(!policy.should_retry(&ok(StatusCode::NOT_FOUND)));
        assert!(!policy.should_retry(&ok(StatusCode::TOO_MANY_REQUESTS)));
        assert!(!policy.should_retry(&Err(Error::cancelled("gone"))));
    }

    #[test]
    fn test_custom_predicate() {
        let policy = RetryPolicy::default()
            .with_should_retry(|response, _| response.is_some_and(|r| r.status() == StatusCode::TOO_MANY_REQUESTS));
        assert!(policy.should_retry(&ok(StatusCode::TOO_MANY_REQUESTS)));
        assert!(!policy.should_retry(&ok(StatusCode::SERVICE_UNAVAILABLE)));
        assert!(!policy.should_retry(&Err(Error::network("connection refused"))));

        // Timing is unchanged and equality ignores the predicate.
        assert_eq!(policy, RetryPolicy::default());
        assert!(format!("{policy:?}").contains("max_retries: 3"));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(
            retries in 0u32..40,
            base_ms in 1u64..1_000,
            extra_ms in 0u64..10_000,
        ) {
            let base = Duration::from_millis(base_ms);
            let cap = Duration::from_millis(base_ms + extra_ms);
            let policy = RetryPolicy::new(retries, base, cap).unwrap();
            let delays: Vec<_> = policy.delays().collect();

            prop_assert_eq!(delays.len(), retries as usize);
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for delay in &delays {
                prop_assert!(*delay <= cap);
                prop_assert!(*delay >= base);
            }
        }
    }
}
