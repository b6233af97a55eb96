use thiserror::Error;

/// Unified error type for the entire crypto-portfolio-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage / Persistence ───────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited. Please wait a moment and try again.")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Coin with id {0} not found")]
    CoinNotFound(String),

    #[error("No live market price for {0}")]
    PriceUnavailable(String),

    // ── Ledger ──────────────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No holding for {0}")]
    HoldingNotFound(String),

    #[error("Cannot sell {requested} {coin_id}: only {held} held")]
    InsufficientHoldings {
        coin_id: String,
        requested: f64,
        held: f64,
    },

    // ── Configuration ───────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Whether the upstream asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            CoreError::RateLimited => true,
            CoreError::Api { status, message } => {
                *status == 429 || message.to_lowercase().contains("rate limit")
            }
            _ => false,
        }
    }

    /// Client errors other than throttling. Repeating these won't help.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::Api { status, .. } if (400..500).contains(status) && *status != 429)
    }

    /// Ledger commands rejected before touching state.
    pub fn is_rejected_command(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::HoldingNotFound(_)
                | CoreError::InsufficientHoldings { .. }
        )
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL; keep the path, drop the query.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
