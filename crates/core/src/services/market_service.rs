use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::CoreError;
use crate::models::coin::{Coin, MarketChart, SearchResult};
use crate::providers::traits::{MarketDataProvider, MarketsQuery};

use super::retry::RetryPolicy;

/// How long a cached response stays fresh, per kind of data.
pub const MARKETS_TTL: Duration = Duration::from_secs(10 * 60);
pub const SEARCH_TTL: Duration = Duration::from_secs(5 * 60);
pub const CHART_TTL: Duration = Duration::from_secs(60);
pub const DETAILS_TTL: Duration = Duration::from_secs(2 * 60);

/// Searches shorter than this return nothing without calling upstream.
pub const MIN_SEARCH_LEN: usize = 3;

/// A coin's market record together with a live, usable price.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub coin: Coin,
    pub price: f64,
}

/// Time-boxed memo of decoded responses, keyed by request.
struct ResponseCache<V> {
    entries: Mutex<HashMap<String, (Instant, V)>>,
    /// Entries older than this are dropped on the next insert.
    max_age: Duration,
}

impl<V: Clone> ResponseCache<V> {
    fn new(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < ttl)
            .map(|(_, value)| value.clone())
    }

    fn insert(&self, key: String, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (stored, _)| stored.elapsed() < self.max_age);
        entries.insert(key, (Instant::now(), value));
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Typed market data operations for the rest of the application.
///
/// Wraps a [`MarketDataProvider`] with the caller-level [`RetryPolicy`] and a
/// freshness cache, so repeated reads inside the freshness window never reach
/// the gateway.
pub struct MarketService {
    provider: Arc<dyn MarketDataProvider>,
    retry: RetryPolicy,
    vs_currency: String,
    markets: ResponseCache<Vec<Coin>>,
    searches: ResponseCache<SearchResult>,
    charts: ResponseCache<MarketChart>,
}

impl std::fmt::Debug for MarketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketService")
            .field("provider", &self.provider.name())
            .field("vs_currency", &self.vs_currency)
            .field("retry", &self.retry)
            .finish()
    }
}

impl MarketService {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            vs_currency: "usd".to_string(),
            markets: ResponseCache::new(MARKETS_TTL.max(DETAILS_TTL)),
            searches: ResponseCache::new(SEARCH_TTL),
            charts: ResponseCache::new(CHART_TTL),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_vs_currency(mut self, vs_currency: impl Into<String>) -> Self {
        self.vs_currency = vs_currency.into().to_lowercase();
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn vs_currency(&self) -> &str {
        &self.vs_currency
    }

    /// A markets query in this service's quote currency.
    pub fn markets_query(&self) -> MarketsQuery {
        MarketsQuery::new(self.vs_currency.clone())
    }

    /// Markets listing, served from cache while fresh.
    pub async fn coins_markets(&self, query: &MarketsQuery) -> Result<Vec<Coin>, CoreError> {
        let key = markets_key(query);
        if let Some(coins) = self.markets.get(&key, MARKETS_TTL) {
            return Ok(coins);
        }
        self.refresh_markets(query).await
    }

    /// Markets listing straight from upstream; refreshes the cache entry.
    pub async fn refresh_markets(&self, query: &MarketsQuery) -> Result<Vec<Coin>, CoreError> {
        let coins = self
            .retry
            .run("coins_markets", || self.provider.coins_markets(query))
            .await?;
        self.markets.insert(markets_key(query), coins.clone());
        Ok(coins)
    }

    /// Coin search. Queries under three characters yield an empty result.
    pub async fn search(&self, query: &str) -> Result<SearchResult, CoreError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(SearchResult::default());
        }
        let key = query.to_lowercase();
        if let Some(result) = self.searches.get(&key, SEARCH_TTL) {
            return Ok(result);
        }
        let result = self
            .retry
            .run("search", || self.provider.search(query))
            .await?;
        self.searches.insert(key, result.clone());
        Ok(result)
    }

    /// Daily price history for the last `days` days.
    pub async fn market_chart(&self, coin_id: &str, days: u32) -> Result<MarketChart, CoreError> {
        let key = format!("{coin_id}:{days}:{}", self.vs_currency);
        if let Some(chart) = self.charts.get(&key, CHART_TTL) {
            return Ok(chart);
        }
        let chart = self
            .retry
            .run("market_chart", || {
                self.provider.market_chart(coin_id, days, &self.vs_currency)
            })
            .await?;
        self.charts.insert(key, chart.clone());
        Ok(chart)
    }

    /// Market record of a single coin.
    pub async fn coin_details(&self, coin_id: &str) -> Result<Coin, CoreError> {
        let query = self.markets_query().page(1, 1).ids([coin_id]);
        let key = format!("details:{}", markets_key(&query));
        let coins = match self.markets.get(&key, DETAILS_TTL) {
            Some(coins) => coins,
            None => {
                let coins = self
                    .retry
                    .run("coin_details", || self.provider.coins_markets(&query))
                    .await?;
                self.markets.insert(key, coins.clone());
                coins
            }
        };
        coins
            .into_iter()
            .find(|c| c.id == coin_id)
            .ok_or_else(|| CoreError::CoinNotFound(coin_id.to_string()))
    }

    /// Live price of a single coin, for pricing a trade.
    ///
    /// Never served from cache. Fails with [`CoreError::RateLimited`] when the
    /// provider answered with stand-in data, and with
    /// [`CoreError::PriceUnavailable`] when the coin is listed without a price.
    pub async fn live_quote(&self, coin_id: &str) -> Result<Quote, CoreError> {
        let query = self.markets_query().page(1, 1).ids([coin_id]);
        let fallbacks_before = self.provider.fallbacks_served();
        let coins = self
            .retry
            .run("live_quote", || self.provider.coins_markets(&query))
            .await?;
        if self.provider.fallbacks_served() > fallbacks_before {
            tracing::warn!(coin_id, "refusing to price from fallback data");
            return Err(CoreError::RateLimited);
        }
        let coin = coins
            .into_iter()
            .find(|c| c.id == coin_id)
            .ok_or_else(|| CoreError::CoinNotFound(coin_id.to_string()))?;
        match coin.current_price {
            Some(price) if price.is_finite() && price > 0.0 => Ok(Quote { coin, price }),
            _ => Err(CoreError::PriceUnavailable(coin_id.to_string())),
        }
    }

    /// Number of responses currently held in the cache.
    pub fn cached_entries(&self) -> usize {
        self.markets.len() + self.searches.len() + self.charts.len()
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.markets.clear();
        self.searches.clear();
        self.charts.clear();
    }
}

fn markets_key(query: &MarketsQuery) -> String {
    format!(
        "{}:{}:{}:{}",
        query.vs_currency,
        query.page,
        query.per_page,
        query.ids.join(",")
    )
}
