use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::coin::{Coin, MarketChart, SearchResult};
use crate::models::settings::Settings;

use super::gateway::{RequestCategory, RequestGateway, UpstreamRequest};
use super::traits::{MarketDataProvider, MarketsQuery};
use super::transport::ReqwestTransport;

/// CoinGecko v3 API provider.
///
/// - **Free tier**: no API key, roughly one request per 1.2 s before the API
///   starts answering 429.
/// - **Endpoints**: `/coins/markets`, `/search`, `/coins/{id}/market_chart`
///
/// Every call goes through the shared [`RequestGateway`], so the rate limit
/// holds across all callers.
#[derive(Debug, Clone)]
pub struct CoinGeckoProvider {
    gateway: RequestGateway,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(gateway: RequestGateway, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            gateway,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Provider over a real HTTP transport, configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let transport = Arc::new(ReqwestTransport::new(settings.request_timeout()));
        let gateway = RequestGateway::new(transport, settings.min_request_interval());
        Self::new(gateway, settings.api_base_url.clone())
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn markets_url(&self, query: &MarketsQuery) -> Result<String, CoreError> {
        let per_page = query.per_page.to_string();
        let page = query.page.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("vs_currency", query.vs_currency.as_str()),
            ("order", "market_cap_desc"),
            ("per_page", per_page.as_str()),
            ("page", page.as_str()),
            ("sparkline", "false"),
            ("price_change_percentage", "24h"),
        ];
        let ids = query.ids.join(",");
        if !ids.is_empty() {
            params.push(("ids", ids.as_str()));
        }
        self.url("/coins/markets", &params)
    }

    pub fn search_url(&self, query: &str) -> Result<String, CoreError> {
        self.url("/search", &[("query", query)])
    }

    pub fn market_chart_url(
        &self,
        coin_id: &str,
        days: u32,
        vs_currency: &str,
    ) -> Result<String, CoreError> {
        if coin_id.is_empty() || coin_id.contains(|c| matches!(c, '/' | '?' | '#')) {
            return Err(CoreError::Validation(format!("Invalid coin id '{coin_id}'")));
        }
        let days = days.to_string();
        self.url(
            &format!("/coins/{coin_id}/market_chart"),
            &[
                ("vs_currency", vs_currency),
                ("days", days.as_str()),
                ("interval", "daily"),
            ],
        )
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<String, CoreError> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map(String::from)
            .map_err(|e| CoreError::Config(format!("Invalid API URL {}{path}: {e}", self.base_url)))
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    async fn coins_markets(&self, query: &MarketsQuery) -> Result<Vec<Coin>, CoreError> {
        let url = self.markets_url(query)?;
        let mut coins: Vec<Coin> = self
            .gateway
            .fetch(UpstreamRequest::new(RequestCategory::Markets, url))
            .await?;
        // A fallback listing ignores the ids filter; apply it here.
        if !query.ids.is_empty() {
            coins.retain(|c| query.ids.contains(&c.id));
        }
        Ok(coins)
    }

    async fn search(&self, query: &str) -> Result<SearchResult, CoreError> {
        let url = self.search_url(query)?;
        self.gateway
            .fetch(UpstreamRequest::new(RequestCategory::Search, url))
            .await
    }

    async fn market_chart(
        &self,
        coin_id: &str,
        days: u32,
        vs_currency: &str,
    ) -> Result<MarketChart, CoreError> {
        let url = self.market_chart_url(coin_id, days, vs_currency)?;
        self.gateway
            .fetch(UpstreamRequest::new(RequestCategory::MarketChart, url))
            .await
    }

    fn fallbacks_served(&self) -> u64 {
        self.gateway.fallbacks_served()
    }
}
