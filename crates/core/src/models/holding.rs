use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A position in a single coin, valued at the last known market price.
///
/// Invariants held by the ledger:
/// - `quantity > 0` (a holding sold down to zero is removed, not kept empty)
/// - `average_buy_price == total_invested / quantity`
/// - `current_value == quantity * current_price`
/// - `profit_loss == current_value - total_invested`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Upstream coin id, e.g. "bitcoin". Unique within a portfolio.
    pub coin_id: String,

    /// Ticker symbol as reported upstream, e.g. "btc"
    pub symbol: String,

    pub name: String,

    /// Image URL for display
    pub image: String,

    pub quantity: f64,

    /// Weighted-average cost per unit
    pub average_buy_price: f64,

    /// Cost basis of the units still held
    pub total_invested: f64,

    pub current_price: f64,

    pub current_value: f64,

    pub profit_loss: f64,

    pub profit_loss_percentage: f64,

    pub last_updated: DateTime<Utc>,
}

impl Holding {
    /// Recompute the valuation fields from quantity, cost basis and current price.
    pub fn revalue(&mut self) {
        self.current_value = self.quantity * self.current_price;
        self.profit_loss = self.current_value - self.total_invested;
        self.profit_loss_percentage = percent_of(self.profit_loss, self.total_invested);
    }
}

/// `part / whole * 100`, or 0 when `whole` is not positive.
///
/// Keeps NaN and infinities out of every percentage the ledger exposes.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
