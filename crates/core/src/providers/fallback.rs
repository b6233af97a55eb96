//! Static stand-in data served when the upstream throttles us.
//!
//! Prices are illustrative snapshots, not live quotes.

use serde_json::Value;

use crate::models::coin::{Coin, SearchCoin, SearchResult};

use super::gateway::RequestCategory;

const IMAGE_BASE: &str = "https://assets.coingecko.com/coins/images";

struct DemoCoin {
    id: &'static str,
    symbol: &'static str,
    name: &'static str,
    image: &'static str,
    price: f64,
    market_cap: f64,
    volume: f64,
    change_24h: f64,
    ath: f64,
    atl: f64,
    supply: f64,
}

const DEMO_COINS: &[DemoCoin] = &[
    DemoCoin {
        id: "bitcoin",
        symbol: "btc",
        name: "Bitcoin",
        image: "1/large/bitcoin.png",
        price: 43_250.0,
        market_cap: 847_000_000_000.0,
        volume: 21_500_000_000.0,
        change_24h: 2.15,
        ath: 69_045.0,
        atl: 67.81,
        supply: 19_580_000.0,
    },
    DemoCoin {
        id: "ethereum",
        symbol: "eth",
        name: "Ethereum",
        image: "279/large/ethereum.png",
        price: 2_580.0,
        market_cap: 310_000_000_000.0,
        volume: 12_300_000_000.0,
        change_24h: 1.42,
        ath: 4_878.26,
        atl: 0.432979,
        supply: 120_180_000.0,
    },
    DemoCoin {
        id: "tether",
        symbol: "usdt",
        name: "Tether",
        image: "325/large/Tether.png",
        price: 1.0,
        market_cap: 91_000_000_000.0,
        volume: 38_000_000_000.0,
        change_24h: 0.01,
        ath: 1.32,
        atl: 0.572521,
        supply: 91_000_000_000.0,
    },
    DemoCoin {
        id: "binancecoin",
        symbol: "bnb",
        name: "BNB",
        image: "825/large/bnb-icon2_2x.png",
        price: 312.5,
        market_cap: 48_000_000_000.0,
        volume: 890_000_000.0,
        change_24h: -0.85,
        ath: 686.31,
        atl: 0.0398177,
        supply: 153_850_000.0,
    },
    DemoCoin {
        id: "solana",
        symbol: "sol",
        name: "Solana",
        image: "4128/large/solana.png",
        price: 98.4,
        market_cap: 42_500_000_000.0,
        volume: 2_100_000_000.0,
        change_24h: 4.73,
        ath: 259.96,
        atl: 0.500801,
        supply: 432_000_000.0,
    },
    DemoCoin {
        id: "ripple",
        symbol: "xrp",
        name: "XRP",
        image: "44/large/xrp-symbol-white-128.png",
        price: 0.62,
        market_cap: 33_700_000_000.0,
        volume: 1_250_000_000.0,
        change_24h: -1.12,
        ath: 3.4,
        atl: 0.00268621,
        supply: 54_300_000_000.0,
    },
    DemoCoin {
        id: "cardano",
        symbol: "ada",
        name: "Cardano",
        image: "975/large/cardano.png",
        price: 0.52,
        market_cap: 18_300_000_000.0,
        volume: 410_000_000.0,
        change_24h: 0.64,
        ath: 3.09,
        atl: 0.01925275,
        supply: 35_200_000_000.0,
    },
    DemoCoin {
        id: "dogecoin",
        symbol: "doge",
        name: "Dogecoin",
        image: "5/large/dogecoin.png",
        price: 0.082,
        market_cap: 11_700_000_000.0,
        volume: 520_000_000.0,
        change_24h: -2.3,
        ath: 0.731578,
        atl: 0.0000869,
        supply: 142_600_000_000.0,
    },
];

/// The markets listing served in place of a throttled `/coins/markets` call.
pub fn demo_coins() -> Vec<Coin> {
    DEMO_COINS
        .iter()
        .enumerate()
        .map(|(rank, c)| Coin {
            id: c.id.to_string(),
            symbol: c.symbol.to_string(),
            name: c.name.to_string(),
            image: format!("{IMAGE_BASE}/{}", c.image),
            current_price: Some(c.price),
            market_cap: Some(c.market_cap),
            market_cap_rank: Some(rank as u32 + 1),
            total_volume: Some(c.volume),
            price_change_percentage_24h: Some(c.change_24h),
            high_24h: Some(c.price * 1.02),
            low_24h: Some(c.price * 0.98),
            ath: Some(c.ath),
            ath_change_percentage: Some((c.price - c.ath) / c.ath * 100.0),
            atl: Some(c.atl),
            atl_change_percentage: Some((c.price - c.atl) / c.atl * 100.0),
            circulating_supply: Some(c.supply),
        })
        .collect()
}

/// The search result served in place of a throttled `/search` call.
pub fn demo_search_result() -> SearchResult {
    SearchResult {
        coins: DEMO_COINS
            .iter()
            .enumerate()
            .map(|(rank, c)| SearchCoin {
                id: c.id.to_string(),
                name: c.name.to_string(),
                symbol: c.symbol.to_uppercase(),
                thumb: format!("{IMAGE_BASE}/{}", c.image.replace("/large/", "/thumb/")),
                market_cap_rank: Some(rank as u32 + 1),
            })
            .collect(),
    }
}

/// Fallback payload for a request category, if that category has one.
pub fn dataset_for(category: RequestCategory) -> Option<Value> {
    match category {
        RequestCategory::Markets => serde_json::to_value(demo_coins()).ok(),
        RequestCategory::Search => serde_json::to_value(demo_search_result()).ok(),
        RequestCategory::MarketChart => None,
    }
}
