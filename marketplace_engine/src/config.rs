//! Engine configuration. Built once (usually by the server from its environment) and passed into API constructors.
use std::time::Duration;

use mkt_common::Secret;

pub const DEFAULT_RESERVATION_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_JOB_MAX_ATTEMPTS: i64 = 5;
pub const DEFAULT_JOB_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// How long stock stays reserved for an unpaid order.
    pub reservation_window: Duration,
    /// Days after the order's last update during which a return may be opened.
    pub return_window_days: i64,
    pub retry_policy: RetryPolicy,
    /// A claimed job whose worker has not finished within this time becomes claimable again.
    pub job_lock_timeout: Duration,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            reservation_window: DEFAULT_RESERVATION_WINDOW,
            return_window_days: DEFAULT_RETURN_WINDOW_DAYS,
            retry_policy: RetryPolicy::default(),
            job_lock_timeout: DEFAULT_JOB_LOCK_TIMEOUT,
        }
    }
}

impl MarketplaceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.reservation_window.is_zero() {
            return Err("The reservation window must be longer than zero".into());
        }
        if self.return_window_days < 0 {
            return Err("The return window cannot be negative".into());
        }
        if self.job_lock_timeout.is_zero() {
            return Err("The job lock timeout must be longer than zero".into());
        }
        self.retry_policy.validate()
    }
}

/// Exponential backoff for failed jobs: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i64,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_JOB_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// The delay before the next attempt, given the number of attempts made so far (starting at 1).
    pub fn backoff(&self, attempts_made: i64) -> Duration {
        let exponent = attempts_made.saturating_sub(1).clamp(0, 30) as u32;
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
    }

    pub fn attempts_exhausted(&self, attempts_made: i64, max_attempts: i64) -> bool {
        attempts_made >= max_attempts.min(self.max_attempts).max(1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("Jobs need at least one attempt".into());
        }
        if self.base_delay > self.max_delay {
            return Err("The base retry delay cannot exceed the maximum delay".into());
        }
        Ok(())
    }
}

/// Settings for the payment gateways.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfig {
    /// Where the hosted card checkout page sends the customer afterwards.
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    /// Shared secret used to verify card network webhook signatures.
    pub card_webhook_secret: Secret<String>,
    /// Maximum age (seconds) of a signed webhook. Zero disables the check.
    pub card_webhook_tolerance_secs: i64,
    /// Whether the synchronous mobile money providers accept payments.
    pub mobile_money_enabled: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(2), Duration::from_secs(20));
        assert_eq!(policy.backoff(3), Duration::from_secs(40));
        assert_eq!(policy.backoff(4), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn attempts_are_bounded_by_job_and_policy() {
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };
        assert!(!policy.attempts_exhausted(2, 5));
        assert!(policy.attempts_exhausted(3, 5));
        assert!(policy.attempts_exhausted(1, 1));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(MarketplaceConfig::default().validate().is_ok());
        let bad = MarketplaceConfig { reservation_window: Duration::ZERO, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
