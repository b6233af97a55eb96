// ═══════════════════════════════════════════════════════════════════
// Integration Tests — portfolio, gateway, market service and price
// sync wired together over a scripted transport
// ═══════════════════════════════════════════════════════════════════

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{market_row, ScriptedTransport};
use crypto_portfolio_core::errors::CoreError;
use crypto_portfolio_core::services::ledger_store::{BuyOrder, SellOrder};
use crypto_portfolio_core::services::market_service::MarketService;
use crypto_portfolio_core::services::price_sync::{PriceSync, SyncOutcome};
use crypto_portfolio_core::services::retry::RetryPolicy;
use crypto_portfolio_core::CryptoPortfolio;

struct Harness {
    transport: Arc<ScriptedTransport>,
    market: Arc<MarketService>,
    sync: PriceSync,
}

fn harness() -> Harness {
    let transport = ScriptedTransport::new();
    let market = Arc::new(
        MarketService::new(Arc::new(common::provider(transport.clone())))
            .with_retry(RetryPolicy::none()),
    );
    let sync = PriceSync::new(market.clone(), Duration::from_secs(60));
    Harness {
        transport,
        market,
        sync,
    }
}

#[tokio::test(start_paused = true)]
async fn buy_from_listing_then_sync_and_sell() {
    let mut h = harness();
    let dir = tempfile::tempdir().unwrap();

    // Pick a coin from the listing and buy it at the listed price.
    h.transport.push_json(json!([
        market_row("bitcoin", "btc", 40_000.0),
        market_row("ethereum", "eth", 2_000.0),
    ]));
    let listing = h.market.coins_markets(&h.market.markets_query()).await.unwrap();
    let eth = listing.iter().find(|c| c.id == "ethereum").unwrap();

    let portfolio = CryptoPortfolio::open_dir(dir.path()).into_shared();
    portfolio
        .lock()
        .await
        .buy(
            BuyOrder::new(&eth.id, &eth.symbol, &eth.name, 3.0, eth.current_price.unwrap())
                .with_image(&eth.image),
        )
        .unwrap();

    // Market moves; the sync pass revalues the holding.
    h.transport.push_json(json!([market_row("ethereum", "eth", 2_500.0)]));
    let outcome = h.sync.sync_once(&portfolio).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Applied { updated: 1 });
    {
        let p = portfolio.lock().await;
        let holding = p.holding("ethereum").unwrap();
        assert_eq!(holding.current_value, 7_500.0);
        assert_eq!(holding.profit_loss, 1_500.0);
        assert_eq!(holding.profit_loss_percentage, 25.0);
        assert_eq!(p.state().total_profit_loss, 1_500.0);
    }

    // Sync request asked only for the held coin.
    let sync_url = h.transport.calls().last().unwrap().clone();
    assert!(sync_url.contains("ids=ethereum"), "{sync_url}");

    // Sell out; the record on disk follows.
    let receipt = portfolio
        .lock()
        .await
        .sell(SellOrder::new("ethereum", 3.0, 2_500.0))
        .unwrap();
    assert!(receipt.closed);
    assert_eq!(receipt.realized_profit_loss, 1_500.0);

    let reopened = CryptoPortfolio::open_dir(dir.path());
    assert!(reopened.holdings().is_empty());
    assert_eq!(reopened.transactions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn throttled_sync_uses_demo_prices() {
    let mut h = harness();
    let portfolio = CryptoPortfolio::in_memory().into_shared();
    portfolio
        .lock()
        .await
        .buy(BuyOrder::new("bitcoin", "btc", "Bitcoin", 1.0, 40_000.0))
        .unwrap();

    h.transport.push(429, r#"{"status":{"error_code":429,"error_message":"rate limited"}}"#);
    let outcome = h.sync.sync_once(&portfolio).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Applied { updated: 1 });
    assert_eq!(
        portfolio.lock().await.holding("bitcoin").unwrap().current_price,
        43_250.0
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_sync_with_same_prices_is_skipped() {
    let mut h = harness();
    let portfolio = CryptoPortfolio::in_memory().into_shared();
    portfolio
        .lock()
        .await
        .buy(BuyOrder::new("bitcoin", "btc", "Bitcoin", 1.0, 40_000.0))
        .unwrap();

    h.transport.push_json(json!([market_row("bitcoin", "btc", 41_000.0)]));
    h.transport.push_json(json!([market_row("bitcoin", "btc", 41_000.0)]));

    assert_eq!(
        h.sync.sync_once(&portfolio).await.unwrap(),
        SyncOutcome::Applied { updated: 1 }
    );
    let snapshot = portfolio.lock().await.state().clone();
    assert_eq!(h.sync.sync_once(&portfolio).await.unwrap(), SyncOutcome::Unchanged);
    assert_eq!(portfolio.lock().await.state(), &snapshot);
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_spaced_queue() {
    let h = harness();
    h.transport.push_json(json!([market_row("bitcoin", "btc", 1.0)]));
    h.transport.push_json(json!({"coins": []}));
    h.transport.push_json(json!({"prices": [[0, 1.0]]}));

    let query = h.market.markets_query();
    let (markets, search, chart) = tokio::join!(
        h.market.coins_markets(&query),
        h.market.search("bitcoin"),
        h.market.market_chart("bitcoin", 7),
    );
    assert_eq!(markets.unwrap().len(), 1);
    assert!(search.unwrap().coins.is_empty());
    assert_eq!(chart.unwrap().prices.len(), 1);

    let times = h.transport.call_times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1200));
    }
    let calls = h.transport.calls();
    assert!(calls[0].contains("/coins/markets"));
    assert!(calls[1].contains("/search"));
    assert!(calls[2].contains("/market_chart"));
}

#[tokio::test(start_paused = true)]
async fn cached_reads_skip_the_gateway() {
    let h = harness();
    h.transport.push_json(json!([market_row("solana", "sol", 100.0)]));

    let query = h.market.markets_query();
    h.market.coins_markets(&query).await.unwrap();
    let again = h.market.coins_markets(&query).await.unwrap();
    assert_eq!(again[0].id, "solana");
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_sync_leaves_portfolio_untouched() {
    let mut h = harness();
    let portfolio = CryptoPortfolio::in_memory().into_shared();
    portfolio
        .lock()
        .await
        .buy(BuyOrder::new("bitcoin", "btc", "Bitcoin", 1.0, 40_000.0))
        .unwrap();
    let before = portfolio.lock().await.state().clone();

    h.transport.push(503, "");
    let err = h.sync.sync_once(&portfolio).await.unwrap_err();
    assert!(matches!(err, CoreError::Api { status: 503, .. }));
    assert_eq!(portfolio.lock().await.state(), &before);
}

#[tokio::test(start_paused = true)]
async fn chart_throttling_surfaces_to_caller() {
    let h = harness();
    h.transport.push(429, "");
    let err = h.market.market_chart("bitcoin", 30).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(
        err.to_string(),
        "Rate limited. Please wait a moment and try again."
    );
}

#[tokio::test(start_paused = true)]
async fn trade_is_not_priced_from_demo_data() {
    let h = harness();
    h.transport.push(429, "");
    let err = h.market.live_quote("bitcoin").await.unwrap_err();
    assert!(matches!(err, CoreError::RateLimited), "got {err:?}");

    // The same throttled answer still serves display reads.
    h.transport.push(429, "");
    let details = h.market.coin_details("bitcoin").await.unwrap();
    assert_eq!(details.current_price, Some(43_250.0));

    h.transport.push_json(json!([market_row("bitcoin", "btc", 61_000.0)]));
    let quote = h.market.live_quote("bitcoin").await.unwrap();
    assert_eq!(quote.price, 61_000.0);
}

#[tokio::test(start_paused = true)]
async fn watcher_sync_keeps_trades_from_other_process() {
    let mut h = harness();
    let dir = tempfile::tempdir().unwrap();
    let watcher = CryptoPortfolio::open_dir(dir.path()).into_shared();
    watcher
        .lock()
        .await
        .buy(BuyOrder::new("bitcoin", "btc", "Bitcoin", 1.0, 40_000.0))
        .unwrap();

    let mut trader = CryptoPortfolio::open_dir(dir.path());
    trader
        .buy(BuyOrder::new("ethereum", "eth", "Ethereum", 2.0, 2_000.0))
        .unwrap();

    h.transport.push_json(json!([
        market_row("bitcoin", "btc", 41_000.0),
        market_row("ethereum", "eth", 2_200.0),
    ]));
    let outcome = h.sync.sync_once(&watcher).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Applied { updated: 2 });

    // The pass asked for the coin the other process bought too.
    let sync_url = h.transport.calls().last().unwrap().clone();
    assert!(sync_url.contains("ids=bitcoin%2Cethereum"), "{sync_url}");

    let reopened = CryptoPortfolio::open_dir(dir.path());
    assert_eq!(reopened.transactions().len(), 2);
    assert_eq!(reopened.holding("ethereum").unwrap().current_price, 2_200.0);
    assert_eq!(reopened.holding("bitcoin").unwrap().current_price, 41_000.0);
}
