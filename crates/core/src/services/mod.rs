pub mod ledger_store;
pub mod market_service;
pub mod price_sync;
pub mod retry;
