use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::coin::{Coin, MarketChart, SearchResult};

/// Parameters of a markets listing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketsQuery {
    pub vs_currency: String,
    pub page: u32,
    pub per_page: u32,
    /// Restrict the listing to these coin ids. Empty means no filter.
    pub ids: Vec<String>,
}

impl Default for MarketsQuery {
    fn default() -> Self {
        Self {
            vs_currency: "usd".to_string(),
            page: 1,
            per_page: 50,
            ids: Vec::new(),
        }
    }
}

impl MarketsQuery {
    pub fn new(vs_currency: impl Into<String>) -> Self {
        Self {
            vs_currency: vs_currency.into(),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Source of market data.
///
/// The production implementation talks to CoinGecko through the request
/// gateway; tests substitute canned providers.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Coins ordered by market cap, one page at a time.
    async fn coins_markets(&self, query: &MarketsQuery) -> Result<Vec<Coin>, CoreError>;

    /// Free-text coin search.
    async fn search(&self, query: &str) -> Result<SearchResult, CoreError>;

    /// Daily price history for one coin over the last `days` days.
    async fn market_chart(
        &self,
        coin_id: &str,
        days: u32,
        vs_currency: &str,
    ) -> Result<MarketChart, CoreError>;

    /// How many responses so far were stand-in data rather than live
    /// upstream answers.
    fn fallbacks_served(&self) -> u64 {
        0
    }
}
