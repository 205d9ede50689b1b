use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::signal::Direction;
use crate::domain::zone::ZoneRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Backtest,
    Paper,
    Live,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Backtest => write!(f, "backtest"),
            RunMode::Paper => write!(f, "paper"),
            RunMode::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Manual,
    TrailingStop,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Manual => "manual",
            ExitReason::TrailingStop => "trailing_stop",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle: created on order fill -> mutated exactly once to closed -> immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub stream_name: String,
    pub mode: RunMode,
    pub direction: Direction,
    pub instrument: String,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub units: Decimal,
    pub zone_price: Option<Decimal>,
    pub zone_role: Option<ZoneRole>,
    pub entry_reason: String,
    pub exit_reason: Option<ExitReason>,
    pub pnl: Option<Decimal>,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Raised when code would otherwise violate a lifecycle invariant, e.g.
/// closing a trade that is already closed.
#[derive(Debug, thiserror::Error)]
pub enum TradeLifecycleError {
    #[error("trade {0} is already closed")]
    AlreadyClosed(i64),
}

impl Trade {
    pub fn open(
        id: i64,
        stream_name: String,
        mode: RunMode,
        direction: Direction,
        instrument: String,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        units: Decimal,
        zone_price: Option<Decimal>,
        zone_role: Option<ZoneRole>,
        entry_reason: String,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            stream_name,
            mode,
            direction,
            instrument,
            entry_price,
            exit_price: None,
            stop_loss,
            take_profit,
            units,
            zone_price,
            zone_role,
            entry_reason,
            exit_reason: None,
            pnl: None,
            status: TradeStatus::Open,
            opened_at,
            closed_at: None,
        }
    }

    /// Close the trade exactly once. A trade in `open` has null exit fields;
    /// a trade in `closed` has all exit fields present — enforced here.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        exit_reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<(), TradeLifecycleError> {
        if self.status == TradeStatus::Closed {
            return Err(TradeLifecycleError::AlreadyClosed(self.id));
        }
        let pnl = match self.direction {
            Direction::Buy => (exit_price - self.entry_price) * self.units,
            Direction::Sell => (self.entry_price - exit_price) * self.units,
        };
        self.pnl = Some(pnl);
        self.exit_price = Some(exit_price);
        self.exit_reason = Some(exit_reason);
        self.closed_at = Some(closed_at);
        self.status = TradeStatus::Closed;
        Ok(())
    }
}
