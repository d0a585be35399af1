//! Server configuration, read once from `MKT_*` environment variables.
//!
//! Missing values fall back to defaults with a log line saying so. [`ServerConfig::validate`] is called before the
//! server starts, and the server refuses to start on an invalid configuration.
use std::{env, time::Duration};

use card_network_tools::CardNetworkConfig;
use log::*;
use marketplace_engine::{MarketplaceConfig, PaymentConfig, RetryPolicy};
use mkt_common::{
    helpers::{parse_boolean_flag, parse_duration_units},
    Secret,
};

use crate::errors::ServerError;

const DEFAULT_MKT_HOST: &str = "127.0.0.1";
const DEFAULT_MKT_PORT: u16 = 8360;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PAYOUT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_JOB_BATCH_SIZE: i64 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub marketplace: MarketplaceConfig,
    pub payments: PaymentConfig,
    pub card_network: CardNetworkConfig,
    pub mobile_money: MobileMoneyWebhookConfig,
    pub workers: WorkerConfig,
}

#[derive(Clone, Debug)]
pub struct MobileMoneyWebhookConfig {
    /// Key for the base64 HMAC-SHA256 in the `X-MobileMoney-Hmac-Sha256` header.
    pub hmac_secret: Secret<String>,
    /// If false, callbacks are accepted without an HMAC. Only for local testing.
    pub hmac_checks: bool,
}

impl Default for MobileMoneyWebhookConfig {
    fn default() -> Self {
        Self { hmac_secret: Secret::default(), hmac_checks: true }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub job_poll_interval: Duration,
    /// Maximum number of jobs claimed per poll.
    pub job_batch_size: i64,
    pub expiry_sweep_interval: Duration,
    pub payout_check_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
            job_batch_size: DEFAULT_JOB_BATCH_SIZE,
            expiry_sweep_interval: DEFAULT_EXPIRY_SWEEP_INTERVAL,
            payout_check_interval: DEFAULT_PAYOUT_CHECK_INTERVAL,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MKT_HOST.to_string(),
            port: DEFAULT_MKT_PORT,
            database_url: String::default(),
            marketplace: MarketplaceConfig::default(),
            payments: PaymentConfig {
                card_webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
                mobile_money_enabled: true,
                ..Default::default()
            },
            card_network: CardNetworkConfig::default(),
            mobile_money: MobileMoneyWebhookConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MKT_HOST").ok().unwrap_or_else(|| DEFAULT_MKT_HOST.into());
        let port = env::var("MKT_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MKT_PORT. {e} Using the default, {DEFAULT_MKT_PORT}, instead."
                    );
                    DEFAULT_MKT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MKT_PORT);
        let database_url = env::var("MKT_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MKT_DATABASE_URL is not set. Please set it to the URL for the marketplace database.");
            String::default()
        });
        let marketplace = marketplace_config_from_env();
        let payments = payment_config_from_env();
        let card_network = CardNetworkConfig::new_from_env_or_default();
        let mobile_money = MobileMoneyWebhookConfig::from_env_or_default();
        let workers = WorkerConfig::from_env_or_default();
        Self { host, port, database_url, marketplace, payments, card_network, mobile_money, workers }
    }

    /// Checks the configuration as a whole. Problems that only disable a feature are logged instead.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.database_url.trim().is_empty() {
            return Err(ServerError::ConfigurationError("MKT_DATABASE_URL must be set".into()));
        }
        self.marketplace.validate().map_err(ServerError::ConfigurationError)?;
        if self.payments.card_webhook_tolerance_secs < 0 {
            return Err(ServerError::ConfigurationError("The card webhook tolerance cannot be negative".into()));
        }
        if self.mobile_money.hmac_checks && self.mobile_money.hmac_secret.is_empty() {
            return Err(ServerError::ConfigurationError(
                "MKT_MOBILE_MONEY_HMAC_SECRET must be set while mobile money HMAC checks are enabled".into(),
            ));
        }
        if self.workers.job_batch_size < 1 {
            return Err(ServerError::ConfigurationError("The job batch size must be at least 1".into()));
        }
        let intervals = [
            self.workers.job_poll_interval,
            self.workers.expiry_sweep_interval,
            self.workers.payout_check_interval,
        ];
        if intervals.iter().any(|d| d.is_zero()) {
            return Err(ServerError::ConfigurationError("Worker intervals must be longer than zero".into()));
        }
        if self.payments.card_webhook_secret.is_empty() {
            warn!("🪛️ MKT_CARD_WEBHOOK_SECRET is not set. Every card network webhook will be rejected.");
        }
        if !self.card_network.is_configured() {
            warn!("🪛️ The card network API is not configured. Card checkouts and card refunds will fail.");
        }
        if !self.mobile_money.hmac_checks {
            warn!("🚨️ Mobile money HMAC checks are DISABLED. Anyone can confirm a mobile money payment.");
        }
        Ok(())
    }
}

fn marketplace_config_from_env() -> MarketplaceConfig {
    let defaults = MarketplaceConfig::default();
    let reservation_window =
        parse_duration_units(env::var("MKT_RESERVATION_WINDOW_MINS").ok(), 60).unwrap_or_else(|| {
            info!(
                "🪛️ MKT_RESERVATION_WINDOW_MINS is not set or invalid. Using the default value of {} minutes.",
                defaults.reservation_window.as_secs() / 60
            );
            defaults.reservation_window
        });
    let return_window_days = env::var("MKT_RETURN_WINDOW_DAYS")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or_else(|| {
            info!(
                "🪛️ MKT_RETURN_WINDOW_DAYS is not set or invalid. Using the default value of {} days.",
                defaults.return_window_days
            );
            defaults.return_window_days
        });
    let max_attempts = env::var("MKT_JOB_MAX_ATTEMPTS")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(defaults.retry_policy.max_attempts);
    let retry_policy = RetryPolicy { max_attempts, ..defaults.retry_policy };
    MarketplaceConfig { reservation_window, return_window_days, retry_policy, ..defaults }
}

fn payment_config_from_env() -> PaymentConfig {
    let checkout_success_url = env::var("MKT_CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
        warn!("🪛️ MKT_CHECKOUT_SUCCESS_URL is not set. Card checkouts will not redirect anywhere useful.");
        String::default()
    });
    let checkout_cancel_url = env::var("MKT_CHECKOUT_CANCEL_URL").unwrap_or_else(|_| checkout_success_url.clone());
    let card_webhook_secret = Secret::new(env::var("MKT_CARD_WEBHOOK_SECRET").unwrap_or_default());
    let card_webhook_tolerance_secs = env::var("MKT_CARD_WEBHOOK_TOLERANCE_SECS")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS);
    let mobile_money_enabled = parse_boolean_flag(env::var("MKT_MOBILE_MONEY_ENABLED").ok(), true);
    PaymentConfig {
        checkout_success_url,
        checkout_cancel_url,
        card_webhook_secret,
        card_webhook_tolerance_secs,
        mobile_money_enabled,
    }
}

impl MobileMoneyWebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("MKT_MOBILE_MONEY_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ MKT_MOBILE_MONEY_HMAC_SECRET is not set. Please set it to the key shared with the mobile money \
                 providers."
            );
            String::default()
        });
        let hmac_checks = parse_boolean_flag(env::var("MKT_MOBILE_MONEY_HMAC_CHECKS").ok(), true);
        Self { hmac_secret: Secret::new(hmac_secret), hmac_checks }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let job_poll_interval = parse_duration_units(env::var("MKT_JOB_POLL_INTERVAL_SECS").ok(), 1)
            .unwrap_or(defaults.job_poll_interval);
        let expiry_sweep_interval = parse_duration_units(env::var("MKT_EXPIRY_SWEEP_INTERVAL_SECS").ok(), 1)
            .unwrap_or(defaults.expiry_sweep_interval);
        let payout_check_interval = parse_duration_units(env::var("MKT_PAYOUT_CHECK_INTERVAL_SECS").ok(), 1)
            .unwrap_or(defaults.payout_check_interval);
        Self { job_poll_interval, expiry_sweep_interval, payout_check_interval, ..defaults }
    }
}
