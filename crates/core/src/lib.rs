pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use errors::CoreError;
use models::{
    holding::Holding,
    portfolio::PortfolioState,
    price::PriceUpdate,
    transaction::Transaction,
};
use services::ledger_store::{
    BuyOrder, LedgerCommand, LedgerEvent, LedgerStore, SellOrder, SellReceipt,
};
use storage::backend::{FileStorage, MemoryStorage};
use storage::manager::StorageManager;

/// A portfolio shared between tasks (e.g. the command handler and the price
/// sync loop). The mutex serializes ledger commands.
pub type SharedPortfolio = Arc<tokio::sync::Mutex<CryptoPortfolio>>;

/// Main entry point for the crypto-portfolio core library.
///
/// Owns the ledger and its persistence. Every committed ledger command is
/// followed by a save of the full snapshot; rejected commands change nothing
/// and write nothing.
///
/// Several processes may open the same record (e.g. a long-running `watch`
/// next to one-off trades). Buys, sells and price updates first pick up
/// whatever another process saved, so a save never discards its work.
#[must_use]
pub struct CryptoPortfolio {
    ledger: LedgerStore,
    storage: StorageManager,
    /// A committed change failed to save; the stored record is behind.
    unsaved: bool,
}

impl std::fmt::Debug for CryptoPortfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.ledger.state();
        f.debug_struct("CryptoPortfolio")
            .field("holdings", &state.holdings.len())
            .field("transactions", &state.transactions.len())
            .field("total_value", &state.total_value)
            .field("storage", &self.storage)
            .finish()
    }
}

impl CryptoPortfolio {
    /// Restore the portfolio saved in `storage`, or start empty if there is
    /// none (or it can't be read).
    pub fn open(storage: StorageManager) -> Self {
        let mut ledger = LedgerStore::new();
        ledger.load(storage.load());
        Self {
            ledger,
            storage,
            unsaved: false,
        }
    }

    /// Open the portfolio stored as JSON under `dir`.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Self {
        Self::open(StorageManager::new(Arc::new(FileStorage::new(dir))))
    }

    /// A portfolio that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::open(StorageManager::new(Arc::new(MemoryStorage::new())))
    }

    pub fn into_shared(self) -> SharedPortfolio {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Apply any ledger command, persisting on success.
    pub fn apply(&mut self, command: LedgerCommand) -> Result<LedgerEvent, CoreError> {
        self.refresh_before_write();
        let event = self.ledger.apply(command)?;
        self.persist();
        Ok(event)
    }

    /// Record a purchase.
    pub fn buy(&mut self, order: BuyOrder) -> Result<Transaction, CoreError> {
        self.refresh_before_write();
        let transaction = self.ledger.buy(order)?;
        self.persist();
        Ok(transaction)
    }

    /// Record a sale. Selling a coin that isn't held, or more than is held,
    /// is rejected and leaves the portfolio untouched.
    pub fn sell(&mut self, order: SellOrder) -> Result<SellReceipt, CoreError> {
        self.refresh_before_write();
        let receipt = self.ledger.sell(order)?;
        self.persist();
        Ok(receipt)
    }

    /// Revalue holdings at fresh prices. Returns how many holdings matched.
    pub fn update_prices(&mut self, updates: &[PriceUpdate]) -> usize {
        self.refresh_before_write();
        let matched = self.ledger.update_prices(updates);
        self.persist();
        matched
    }

    /// Wipe all holdings and history.
    pub fn clear(&mut self) {
        self.ledger.clear();
        self.persist();
    }

    /// Replace the whole portfolio with `state` and persist it.
    pub fn restore(&mut self, state: PortfolioState) {
        self.ledger.load(state);
        self.persist();
    }

    /// Discard in-memory state and re-read the saved snapshot.
    pub fn reload(&mut self) {
        self.ledger.load(self.storage.load());
        self.unsaved = false;
    }

    /// Adopt the stored record if another process changed it. Returns
    /// whether the in-memory state was replaced.
    ///
    /// A record that can't be read is reported and the in-memory state kept.
    /// Changes this process failed to save are never thrown away.
    pub fn refresh(&mut self) -> Result<bool, CoreError> {
        if self.unsaved {
            return Ok(false);
        }
        let stored = self.storage.try_load()?.unwrap_or_default();
        if &stored == self.ledger.state() {
            return Ok(false);
        }
        tracing::debug!(key = self.storage.key(), "picked up externally saved portfolio");
        self.ledger.load(stored);
        Ok(true)
    }

    /// Write the current snapshot, reporting failure to the caller.
    pub fn save(&self) -> Result<(), CoreError> {
        self.storage.save(self.ledger.state())
    }

    // ── Reads ───────────────────────────────────────────────────────

    #[must_use]
    pub fn state(&self) -> &PortfolioState {
        self.ledger.state()
    }

    #[must_use]
    pub fn holding(&self, coin_id: &str) -> Option<&Holding> {
        self.ledger.state().holding(coin_id)
    }

    /// Holdings, largest current value first.
    #[must_use]
    pub fn holdings(&self) -> Vec<&Holding> {
        self.ledger.state().holdings_by_value()
    }

    /// Full transaction log, oldest first.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.ledger.state().transactions
    }

    /// Ids of the coins currently held.
    #[must_use]
    pub fn coin_ids(&self) -> Vec<String> {
        self.ledger.state().coin_ids()
    }

    /// Pretty JSON of the whole snapshot (for export/debugging).
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self.ledger.state())
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize portfolio: {e}")))
    }

    // ── Internal ────────────────────────────────────────────────────

    fn refresh_before_write(&mut self) {
        if let Err(e) = self.refresh() {
            tracing::warn!(key = self.storage.key(), error = %e, "could not re-read portfolio record");
        }
    }

    /// Save after a committed command. The ledger stays authoritative: a
    /// failed write is logged, not rolled back.
    fn persist(&mut self) {
        match self.save() {
            Ok(()) => self.unsaved = false,
            Err(e) => {
                self.unsaved = true;
                tracing::warn!(key = self.storage.key(), error = %e, "failed to persist portfolio");
            }
        }
    }
}
