use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// An actionable entry produced by a strategy pipeline that has passed every gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySignal {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub zone: Option<Zone>,
    pub reason: String,
    pub stream: String,
    pub evaluated_at: DateTime<Utc>,
}

impl EntrySignal {
    /// `for a buy, stop < entry < target; for a sell, stop > entry > target`.
    pub fn directionally_valid(&self) -> bool {
        match self.direction {
            Direction::Buy => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Direction::Sell => self.stop_loss > self.entry_price && self.entry_price > self.take_profit,
        }
    }

    /// Realised reward-to-risk ratio: |TP - entry| / |entry - SL|.
    pub fn realised_rr(&self) -> Option<Decimal> {
        let risk = (self.entry_price - self.stop_loss).abs();
        if risk.is_zero() {
            return None;
        }
        let reward = (self.take_profit - self.entry_price).abs();
        Some(reward / risk)
    }
}

/// Per-gate pass/fail diagnostics accumulated up to the point a strategy
/// either produced a signal or vetoed, surfaced to the status projection so
/// it can explain "why not traded".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateDiagnostics {
    pub passed: Vec<String>,
    pub failed_gate: Option<String>,
    pub fields: std::collections::BTreeMap<String, String>,
}

impl GateDiagnostics {
    pub fn record_pass(&mut self, gate: &str) {
        self.passed.push(gate.to_string());
    }

    pub fn fail(&mut self, gate: &str) {
        self.failed_gate = Some(gate.to_string());
    }

    pub fn field(&mut self, key: &str, value: impl ToString) {
        self.fields.insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StrategyResult {
    Signal(EntrySignal),
    Veto {
        reason: String,
        diagnostics: GateDiagnostics,
    },
}

impl StrategyResult {
    pub fn veto(reason: impl Into<String>, diagnostics: GateDiagnostics) -> Self {
        StrategyResult::Veto {
            reason: reason.into(),
            diagnostics,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, StrategyResult::Signal(_))
    }
}
