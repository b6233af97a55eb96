use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::holding::{percent_of, Holding};
use super::transaction::Transaction;

/// The complete ledger snapshot. Everything in here gets serialized and saved
/// as the single persisted portfolio record.
///
/// The four `total_*` fields are derived: they are recomputed from `holdings`
/// after every ledger command and never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioState {
    /// Open positions keyed by coin id
    pub holdings: BTreeMap<String, Holding>,

    /// Buy/sell log, oldest first
    pub transactions: Vec<Transaction>,

    #[serde(default)]
    pub total_value: f64,

    #[serde(default)]
    pub total_invested: f64,

    #[serde(default)]
    pub total_profit_loss: f64,

    #[serde(default)]
    pub total_profit_loss_percentage: f64,
}

impl PortfolioState {
    /// The canonical empty portfolio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive the portfolio aggregates as sums over current holdings.
    pub fn recompute_totals(&mut self) {
        self.total_value = self.holdings.values().map(|h| h.current_value).sum();
        self.total_invested = self.holdings.values().map(|h| h.total_invested).sum();
        self.total_profit_loss = self.total_value - self.total_invested;
        self.total_profit_loss_percentage =
            percent_of(self.total_profit_loss, self.total_invested);
    }

    pub fn holding(&self, coin_id: &str) -> Option<&Holding> {
        self.holdings.get(coin_id)
    }

    /// Ids of every coin currently held, in key order.
    pub fn coin_ids(&self) -> Vec<String> {
        self.holdings.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty() && self.transactions.is_empty()
    }

    /// Share of the portfolio's current value held in `coin_id`, in percent.
    /// Returns 0 for unknown coins or an empty/worthless portfolio.
    pub fn allocation(&self, coin_id: &str) -> f64 {
        self.holdings
            .get(coin_id)
            .map(|h| percent_of(h.current_value, self.total_value))
            .unwrap_or(0.0)
    }

    /// Holdings sorted by current value, largest first.
    pub fn holdings_by_value(&self) -> Vec<&Holding> {
        let mut holdings: Vec<&Holding> = self.holdings.values().collect();
        holdings.sort_by(|a, b| {
            b.current_value
                .partial_cmp(&a.current_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        holdings
    }

    /// Transactions for one coin, newest first.
    pub fn transactions_for(&self, coin_id: &str) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .rev()
            .filter(|t| t.coin_id == coin_id)
            .collect()
    }
}
