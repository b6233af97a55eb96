use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::coin::Coin;
use crate::models::price::{price_signature, PriceUpdate};
use crate::models::settings::Settings;
use crate::CryptoPortfolio;

use super::market_service::MarketService;

/// What one sync pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The portfolio holds no coins; nothing was requested.
    NothingTracked,
    /// Upstream returned no price for any held coin.
    NoPrices,
    /// Same prices as the last applied batch; the ledger was left alone.
    Unchanged,
    /// Prices were applied to this many holdings.
    Applied { updated: usize },
}

/// Keeps holding valuations in step with the market.
///
/// Each pass fetches current prices for the held coins and hands them to the
/// ledger, unless the batch is identical to the last one applied and no
/// transaction was recorded since. Skipping identical batches avoids
/// pointless ledger writes and persistence churn.
#[derive(Debug)]
pub struct PriceSync {
    market: Arc<MarketService>,
    interval: Duration,
    page_size: u32,
    last_signature: Option<String>,
    /// Newest transaction when `last_signature` was applied.
    applied_after: Option<Uuid>,
}

impl PriceSync {
    pub fn new(market: Arc<MarketService>, interval: Duration) -> Self {
        Self {
            market,
            interval,
            page_size: 250,
            last_signature: None,
            applied_after: None,
        }
    }

    pub fn from_settings(market: Arc<MarketService>, settings: &Settings) -> Self {
        Self::new(market, settings.sync_interval()).with_page_size(settings.sync_page_size)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signature of the last batch handed to the ledger.
    pub fn last_signature(&self) -> Option<&str> {
        self.last_signature.as_deref()
    }

    /// Forget the last applied batch so the next one is applied regardless.
    pub fn reset(&mut self) {
        self.last_signature = None;
        self.applied_after = None;
    }

    /// Fetch current prices for `coin_ids`, one markets page per
    /// `page_size` coins.
    pub async fn fetch_updates(&self, coin_ids: &[String]) -> Result<Vec<PriceUpdate>, CoreError> {
        let mut coins = Vec::new();
        for chunk in coin_ids.chunks(self.page_size as usize) {
            let query = self
                .market
                .markets_query()
                .page(1, chunk.len() as u32)
                .ids(chunk.iter().cloned());
            coins.extend(self.market.refresh_markets(&query).await?);
        }
        Ok(price_updates_from(coin_ids, &coins))
    }

    /// Hand `updates` to the ledger unless they match the last applied batch.
    ///
    /// A buy or sell since that batch (e.g. a position reopened at its buy
    /// price) makes the ledger stale again, so the batch is applied anyway.
    pub fn apply(&mut self, portfolio: &mut CryptoPortfolio, updates: Vec<PriceUpdate>) -> SyncOutcome {
        if updates.is_empty() {
            return SyncOutcome::NoPrices;
        }
        let signature = price_signature(&updates);
        let newest = newest_transaction(portfolio);
        if self.last_signature.as_deref() == Some(signature.as_str()) && self.applied_after == newest {
            return SyncOutcome::Unchanged;
        }
        let updated = portfolio.update_prices(&updates);
        self.last_signature = Some(signature);
        self.applied_after = newest_transaction(portfolio);
        tracing::info!(updated, "applied price update");
        SyncOutcome::Applied { updated }
    }

    /// One full pass. The portfolio lock is not held while waiting on the
    /// network.
    pub async fn sync_once(&mut self, portfolio: &Mutex<CryptoPortfolio>) -> Result<SyncOutcome, CoreError> {
        let coin_ids = {
            let mut portfolio = portfolio.lock().await;
            if let Err(e) = portfolio.refresh() {
                tracing::warn!(error = %e, "syncing against last known portfolio");
            }
            portfolio.coin_ids()
        };
        if coin_ids.is_empty() {
            return Ok(SyncOutcome::NothingTracked);
        }
        let updates = self.fetch_updates(&coin_ids).await?;
        let mut portfolio = portfolio.lock().await;
        Ok(self.apply(&mut portfolio, updates))
    }

    /// Sync every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped. Failed passes are logged and retried on the next tick.
    pub async fn run(mut self, portfolio: Arc<Mutex<CryptoPortfolio>>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sync_once(&portfolio).await {
                        Ok(outcome) => tracing::debug!(?outcome, "price sync pass finished"),
                        Err(e) => tracing::warn!(error = %e, "price sync pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("price sync stopped");
                        return;
                    }
                }
            }
        }
    }
}

fn newest_transaction(portfolio: &CryptoPortfolio) -> Option<Uuid> {
    portfolio.transactions().last().map(|t| t.id)
}

/// Pick the current price of each tracked coin out of a markets listing.
/// Coins missing from the listing, or listed without a price, are left out.
pub fn price_updates_from(coin_ids: &[String], coins: &[Coin]) -> Vec<PriceUpdate> {
    let prices: HashMap<&str, f64> = coins
        .iter()
        .filter_map(|c| c.current_price.map(|p| (c.id.as_str(), p)))
        .collect();
    coin_ids
        .iter()
        .filter_map(|id| prices.get(id.as_str()).map(|&p| PriceUpdate::new(id.clone(), p)))
        .collect()
}
