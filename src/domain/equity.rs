use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trade::RunMode;

/// Append-only row; one per Drawdown Supervisor update that engines choose to record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub mode: RunMode,
    pub equity: Decimal,
    pub balance: Decimal,
    pub peak_equity: Decimal,
    pub drawdown_pct: Decimal,
    pub open_position_count: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Derived, process-wide, never persisted as a single row — readers take a
/// consistent snapshot from the Drawdown Supervisor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountState {
    pub equity: Decimal,
    pub balance: Decimal,
    pub unrealised_pnl: Decimal,
    pub open_position_count: u32,
    pub drawdown_pct: Decimal,
}
