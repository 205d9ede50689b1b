use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::candle::{Candle, Granularity};
use crate::domain::stream_config::StreamConfig;

/// Everything a strategy needs to evaluate one cycle: pre-fetched candle
/// series keyed by granularity, the owning stream's configuration, and the
/// timestamp the cycle is evaluating at. Built fresh every cycle by the
/// trading engine; strategies never hold their own state across cycles.
pub struct StrategyContext {
    pub config: StreamConfig,
    pub candles: HashMap<Granularity, Vec<Candle>>,
    pub evaluated_at: DateTime<Utc>,
}

impl StrategyContext {
    pub fn series(&self, granularity: Granularity) -> Option<&[Candle]> {
        self.candles.get(&granularity).map(|v| v.as_slice())
    }

    pub fn has_minimum(&self, granularity: Granularity, minimum: usize) -> bool {
        self.series(granularity)
            .map(|s| s.len() >= minimum)
            .unwrap_or(false)
    }

    pub fn latest(&self, granularity: Granularity) -> Option<&Candle> {
        self.series(granularity).and_then(|s| s.last())
    }
}
