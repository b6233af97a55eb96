use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CoreError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Runtime configuration. Every field has a default, so a partial TOML file
/// (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the market data API, without a trailing slash.
    pub api_base_url: String,

    /// Quote currency for every price (e.g., "usd").
    pub vs_currency: String,

    /// Minimum gap between two upstream requests. The free API tier
    /// tolerates roughly one call per 1.2 s.
    pub min_request_interval_ms: u64,

    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,

    /// How often the price sync loop polls for fresh prices.
    pub sync_interval_secs: u64,

    /// Page size of the markets request used by the price sync.
    pub sync_page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            vs_currency: "usd".to_string(),
            min_request_interval_ms: 1200,
            request_timeout_secs: 30,
            sync_interval_secs: 60,
            sync_page_size: 250,
        }
    }
}

impl Settings {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Reject settings the rest of the library cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(CoreError::Config(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }
        let currency = self.vs_currency.trim();
        if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Config(format!(
                "Invalid vs_currency '{}'",
                self.vs_currency
            )));
        }
        if self.sync_interval_secs == 0 {
            return Err(CoreError::Config("sync_interval_secs must be positive".into()));
        }
        if !(1..=250).contains(&self.sync_page_size) {
            return Err(CoreError::Config(format!(
                "sync_page_size must be between 1 and 250, got {}",
                self.sync_page_size
            )));
        }
        Ok(())
    }
}
