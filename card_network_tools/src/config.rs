use std::time::Duration;

use log::*;
use mkt_common::{helpers::parse_duration_units, Secret};

const DEFAULT_API_BASE: &str = "https://api.cardnetwork.example";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct CardNetworkConfig {
    /// Base URL of the provider REST API, without a trailing slash.
    pub api_base: String,
    /// Bearer key for outbound calls.
    pub secret_key: Secret<String>,
    /// Upper bound on the duration of any single outbound request.
    pub timeout: Duration,
}

impl Default for CardNetworkConfig {
    fn default() -> Self {
        Self { api_base: DEFAULT_API_BASE.to_string(), secret_key: Secret::default(), timeout: DEFAULT_TIMEOUT }
    }
}

impl CardNetworkConfig {
    pub fn new(api_base: &str, secret_key: Secret<String>, timeout: Duration) -> Self {
        Self { api_base: api_base.trim_end_matches('/').to_string(), secret_key, timeout }
    }

    pub fn new_from_env_or_default() -> Self {
        let api_base = std::env::var("MKT_CARD_API_BASE").unwrap_or_else(|_| {
            warn!("🪛️ MKT_CARD_API_BASE not set, using {DEFAULT_API_BASE}");
            DEFAULT_API_BASE.to_string()
        });
        let secret_key = Secret::new(std::env::var("MKT_CARD_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ MKT_CARD_SECRET_KEY not set. Card network checkouts will be unavailable.");
            String::default()
        }));
        let timeout = parse_duration_units(std::env::var("MKT_CARD_TIMEOUT_SECS").ok(), 1).unwrap_or_else(|| {
            info!("🪛️ MKT_CARD_TIMEOUT_SECS is not set or invalid. Using {}s.", DEFAULT_TIMEOUT.as_secs());
            DEFAULT_TIMEOUT
        });
        Self::new(&api_base, secret_key, timeout)
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }
}
