pub mod coingecko;
pub mod fallback;
pub mod gateway;
pub mod traits;
pub mod transport;
