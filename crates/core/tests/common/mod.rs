//! Shared test fixtures: a scripted HTTP transport and sample market data.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crypto_portfolio_core::errors::CoreError;
use crypto_portfolio_core::providers::coingecko::CoinGeckoProvider;
use crypto_portfolio_core::providers::gateway::RequestGateway;
use crypto_portfolio_core::providers::transport::{HttpResponse, HttpTransport};

pub const TEST_BASE_URL: &str = "https://api.test.invalid/api/v3";

/// Answers requests from a queue of canned responses, in order, and records
/// every URL it was asked for. Once the queue is empty it answers `200 []`.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, CoreError>>>,
    calls: Mutex<Vec<(Instant, String)>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every response takes `latency` to arrive.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn push(&self, status: u16, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    pub fn push_json(&self, body: serde_json::Value) {
        self.push(200, body.to_string());
    }

    pub fn push_error(&self, error: CoreError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, u)| u.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, CoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), url.to_string()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(HttpResponse::new(200, "[]")))
    }
}

/// Gateway over `transport` with the given spacing.
pub fn gateway(transport: Arc<ScriptedTransport>, min_interval: Duration) -> RequestGateway {
    RequestGateway::new(transport, min_interval)
}

/// CoinGecko provider over `transport`, spaced 1.2 s like production.
pub fn provider(transport: Arc<ScriptedTransport>) -> CoinGeckoProvider {
    CoinGeckoProvider::new(
        gateway(transport, Duration::from_millis(1200)),
        TEST_BASE_URL,
    )
}

/// One `/coins/markets` row with only the fields the client needs.
pub fn market_row(id: &str, symbol: &str, price: f64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "symbol": symbol,
        "name": id,
        "image": format!("https://img.test/{id}.png"),
        "current_price": price,
        "market_cap": null,
        "market_cap_rank": null,
        "total_volume": null,
        "price_change_percentage_24h": null,
        "high_24h": null,
        "low_24h": null,
        "ath": null,
        "ath_change_percentage": null,
        "atl": null,
        "atl_change_percentage": null,
        "circulating_supply": null
    })
}
