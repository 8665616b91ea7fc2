//! Retry policy for generation attempts: exponential backoff with jitter,
//! a retry predicate, and an optional deadline across all attempts.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use ragachat_config::RetryConfig;
use ragachat_core::GenerationError;

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = Arc<dyn Fn(&GenerationError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    /// Fraction of each delay randomized in either direction.
    pub jitter: f64,
    pub max_backoff: Duration,
    /// Bound on the whole call including backoff sleeps.
    pub overall_deadline: Option<Duration>,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            multiplier: 2.0,
            jitter: 0.5,
            max_backoff: Duration::from_secs(30),
            overall_deadline: None,
            predicate: Arc::new(|_| true),
        }
    }

    /// No retries, no delay. The first failure goes straight to the fallback.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO).with_jitter(0.0)
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }

    /// Only retry errors accepted by `predicate`. The default retries everything.
    pub fn retry_if(
        mut self,
        predicate: impl Fn(&GenerationError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    pub fn should_retry(&self, error: &GenerationError) -> bool {
        (self.predicate)(error)
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before retry number `retry` (1-based), jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        let jittered = (base.as_millis() as f64 * factor).min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let policy = Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
        )
        .with_multiplier(config.multiplier)
        .with_jitter(config.jitter)
        .with_max_backoff(Duration::from_millis(config.max_backoff_ms));

        if config.overall_deadline_secs > 0 {
            policy.with_deadline(Duration::from_secs(config.overall_deadline_secs))
        } else {
            policy
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("max_backoff", &self.max_backoff)
            .field("overall_deadline", &self.overall_deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff, Duration::from_secs(2));
        assert_eq!(policy.overall_deadline, Some(Duration::from_secs(300)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2))
            .with_jitter(0.0)
            .with_max_backoff(Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2)).with_jitter(0.5);
        for _ in 0..100 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_secs(1), "too short: {d:?}");
            assert!(d <= Duration::from_secs(3), "too long: {d:?}");
        }
    }

    #[test]
    fn default_predicate_retries_everything() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&GenerationError::Network("reset".into())));
        assert!(policy.should_retry(&GenerationError::ApiError {
            status_code: 400,
            message: "bad".into(),
        }));
    }

    #[test]
    fn custom_predicate_is_honored() {
        let policy = RetryPolicy::default().retry_if(|e| {
            !matches!(e, GenerationError::ApiError { status_code, .. } if *status_code < 500)
        });
        assert!(policy.should_retry(&GenerationError::Timeout("slow".into())));
        assert!(!policy.should_retry(&GenerationError::ApiError {
            status_code: 401,
            message: "denied".into(),
        }));
    }

    #[test]
    fn zero_deadline_disables_it() {
        let config = RetryConfig {
            overall_deadline_secs: 0,
            ..RetryConfig::default()
        };
        assert!(RetryPolicy::from(&config).overall_deadline.is_none());
    }
}
