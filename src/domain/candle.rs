use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A timeframe tag a candle series was fetched at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

/// Immutable OHLCV bar. Equality is by (instrument, granularity, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub instrument: String,
    pub granularity: Granularity,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl PartialEq for Candle {
    fn eq(&self, other: &Self) -> bool {
        self.instrument == other.instrument
            && self.granularity == other.granularity
            && self.timestamp == other.timestamp
    }
}

impl Candle {
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> Decimal {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> Decimal {
        self.open.min(self.close) - self.low
    }

    /// Whether this candle's high-low range intersects `level`.
    pub fn touches(&self, level: Decimal) -> bool {
        self.low <= level && level <= self.high
    }
}
