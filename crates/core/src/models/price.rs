use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A fresh market price for one held coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub coin_id: String,
    pub current_price: f64,
}

impl PriceUpdate {
    pub fn new(coin_id: impl Into<String>, current_price: f64) -> Self {
        Self {
            coin_id: coin_id.into(),
            current_price,
        }
    }
}

/// Canonical fingerprint of a batch of price updates.
///
/// Order-independent: the `coin_id:price` pairs are sorted before joining, so
/// two batches with the same prices in a different order share a signature.
pub fn price_signature(updates: &[PriceUpdate]) -> String {
    let mut pairs: Vec<String> = updates
        .iter()
        .map(|u| format!("{}:{}", u.coin_id, u.current_price))
        .collect();
    pairs.sort();
    pairs.join("|")
}

/// A single chart sample. Upstream encodes it as a `[timestamp_ms, price]` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

impl Serialize for PricePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.timestamp_ms as f64, self.price).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PricePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Timestamps arrive as JSON numbers that may carry a fractional part.
        let (timestamp, price) = <(f64, f64)>::deserialize(deserializer)?;
        Ok(Self {
            timestamp_ms: timestamp as i64,
            price,
        })
    }
}
