//! Configuration for paging sessions.

use crate::error::{PagingError, PagingResult};
use std::time::Duration;

/// What a cache-backed session does on its first load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitializeAction {
    /// Fetch fresh data with a REFRESH before serving anything.
    #[default]
    LaunchInitialRefresh,
    /// Serve cached rows first; the remote is only hit at a boundary or on
    /// an explicit refresh.
    SkipInitialRefresh,
}

/// Configuration for a paging session.
#[derive(Debug, Clone)]
pub struct PagerConfig {
    /// Number of records requested per remote page.
    pub page_size: u32,
    /// Number of records read for the first load after a refresh.
    pub initial_load_size: u32,
    /// How close to an edge of the loaded data an access must be to
    /// trigger loading more in that direction.
    pub prefetch_distance: u32,
    /// Upper bound on a single remote fetch. Elapsing counts as a transient
    /// fetch failure.
    pub fetch_timeout: Duration,
    /// First-load behaviour of cache-backed sessions.
    pub initialize_action: InitializeAction,
    /// Outer retry policy used by `Pager::retry_with_backoff`.
    pub retry: RetryConfig,
}

impl PagerConfig {
    /// Creates a configuration for `page_size` records per page.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            initial_load_size: page_size,
            prefetch_distance: page_size,
            fetch_timeout: Duration::from_secs(30),
            initialize_action: InitializeAction::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the size of the first load after a refresh.
    pub fn with_initial_load_size(mut self, size: u32) -> Self {
        self.initial_load_size = size;
        self
    }

    /// Sets the prefetch distance.
    pub fn with_prefetch_distance(mut self, distance: u32) -> Self {
        self.prefetch_distance = distance;
        self
    }

    /// Sets the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the first-load behaviour.
    pub fn with_initialize_action(mut self, action: InitializeAction) -> Self {
        self.initialize_action = action;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks that the configuration can drive a session.
    ///
    /// # Errors
    ///
    /// Returns [`PagingError::InvalidConfig`] for a zero page size, a zero
    /// initial load size, a zero fetch timeout, or a retry backoff
    /// multiplier that is not a finite number of at least 1.
    pub fn validate(&self) -> PagingResult<()> {
        if self.page_size == 0 {
            return Err(PagingError::invalid_config("page_size must be positive"));
        }
        if self.initial_load_size == 0 {
            return Err(PagingError::invalid_config("initial_load_size must be positive"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(PagingError::invalid_config("fetch_timeout must be positive"));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(PagingError::invalid_config(format!(
                "retry backoff_multiplier must be finite and at least 1.0, got {multiplier}"
            )));
        }
        Ok(())
    }
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Configuration for retry behavior.
///
/// The core never retries on its own; this policy is only applied when the
/// consumer opts in through `Pager::retry_with_backoff`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.add_jitter {
            // Up to 25% on top of the capped delay.
            Duration::from_secs_f64(capped + capped * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pager_config_builder() {
        let config = PagerConfig::new(20)
            .with_initial_load_size(60)
            .with_prefetch_distance(5)
            .with_fetch_timeout(Duration::from_secs(2))
            .with_initialize_action(InitializeAction::SkipInitialRefresh);

        assert_eq!(config.page_size, 20);
        assert_eq!(config.initial_load_size, 60);
        assert_eq!(config.prefetch_distance, 5);
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert_eq!(
            config.initialize_action,
            InitializeAction::SkipInitialRefresh
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_follow_page_size() {
        let config = PagerConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.initial_load_size, 50);
        assert_eq!(
            config.initialize_action,
            InitializeAction::LaunchInitialRefresh
        );
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        assert!(matches!(
            PagerConfig::new(0).validate(),
            Err(PagingError::InvalidConfig(_))
        ));
        assert!(PagerConfig::new(10)
            .with_initial_load_size(0)
            .validate()
            .is_err());
        assert!(PagerConfig::new(10)
            .with_fetch_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        for multiplier in [-2.0, 0.5, f64::NAN, f64::INFINITY] {
            let config = PagerConfig::new(10)
                .with_retry(RetryConfig::new(3).with_backoff_multiplier(multiplier));
            assert!(
                matches!(config.validate(), Err(PagingError::InvalidConfig(_))),
                "multiplier {multiplier} accepted"
            );
        }
        assert!(PagerConfig::new(10)
            .with_retry(RetryConfig::no_retry())
            .validate()
            .is_ok());
    }

    #[test]
    fn retry_delay_never_negative() {
        let retry = RetryConfig::new(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(-2.0)
            .with_jitter(false);
        assert_eq!(retry.delay_for_attempt(2), Duration::ZERO);
    }

    #[test]
    fn retry_delay_without_jitter_is_exact() {
        let retry = RetryConfig::new(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(3.0)
            .with_jitter(false);

        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[test]
    fn retry_delay_respects_max() {
        let retry = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = retry.delay_for_attempt(6);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(6250));
    }

    #[test]
    fn no_retry_is_single_attempt() {
        let retry = RetryConfig::no_retry();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay_for_attempt(3), Duration::ZERO);
    }
}
