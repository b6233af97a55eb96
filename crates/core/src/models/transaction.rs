use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Buy => write!(f, "Buy"),
            TransactionKind::Sell => write!(f, "Sell"),
        }
    }
}

/// An immutable buy/sell record.
///
/// Transactions are only ever appended to the log; the sole way to remove one
/// is clearing the whole portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,

    pub coin_id: String,

    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// Units of the coin (always positive)
    pub quantity: f64,

    /// Unit price paid or received
    pub price: f64,

    /// `quantity * price`
    pub total_amount: f64,

    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(kind: TransactionKind, coin_id: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            coin_id: coin_id.into(),
            kind,
            quantity,
            price,
            total_amount: quantity * price,
            timestamp: Utc::now(),
        }
    }
}
