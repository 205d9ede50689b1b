//! Drawdown Supervisor: process-wide singleton tracking peak equity and
//! latching a circuit breaker once drawdown exceeds a configured ceiling.
//! Single writer, many readers: updates run under an exclusive critical
//! section, reads take a copy-on-read snapshot of small scalars.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::equity::AccountState;

#[derive(Debug, Clone, Copy)]
struct SupervisorState {
    peak_equity: Decimal,
    current_equity: Decimal,
    open_position_count: u32,
    circuit_breaker_active: bool,
}

/// Shared handle; clone freely, all clones observe the same state.
#[derive(Clone)]
pub struct DrawdownSupervisor {
    max_drawdown_pct: Decimal,
    state: Arc<RwLock<SupervisorState>>,
}

impl DrawdownSupervisor {
    pub fn new(starting_equity: Decimal, max_drawdown_pct: Decimal) -> Self {
        Self {
            max_drawdown_pct,
            state: Arc::new(RwLock::new(SupervisorState {
                peak_equity: starting_equity,
                current_equity: starting_equity,
                open_position_count: 0,
                circuit_breaker_active: false,
            })),
        }
    }

    /// Record a fresh equity reading. Once latched, `circuit_breaker_active`
    /// never clears itself; only a process restart (a new supervisor) does.
    pub async fn record_equity(&self, equity: Decimal, open_position_count: u32) {
        let mut state = self.state.write().await;
        state.current_equity = equity;
        state.open_position_count = open_position_count;
        state.peak_equity = state.peak_equity.max(equity);

        let drawdown_pct = if state.peak_equity.is_zero() {
            Decimal::ZERO
        } else {
            (state.peak_equity - equity) / state.peak_equity * Decimal::from(100)
        };

        if drawdown_pct >= self.max_drawdown_pct && !state.circuit_breaker_active {
            state.circuit_breaker_active = true;
            warn!(%drawdown_pct, max = %self.max_drawdown_pct, "drawdown circuit breaker latched");
        }
    }

    /// Advisory at the microsecond boundary: true means no new cycle may
    /// place an order, not that no order is ever in flight at the instant
    /// this is read.
    pub async fn breaker_active(&self) -> bool {
        self.state.read().await.circuit_breaker_active
    }

    pub async fn account_state(&self, unrealised_pnl: Decimal, balance: Decimal) -> AccountState {
        let state = self.state.read().await;
        let drawdown_pct = if state.peak_equity.is_zero() {
            Decimal::ZERO
        } else {
            (state.peak_equity - state.current_equity) / state.peak_equity * Decimal::from(100)
        };
        AccountState {
            equity: state.current_equity,
            balance,
            unrealised_pnl,
            open_position_count: state.open_position_count,
            drawdown_pct,
        }
    }

    pub async fn peak_equity(&self) -> Decimal {
        self.state.read().await.peak_equity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn breaker_stays_inactive_below_threshold() {
        let supervisor = DrawdownSupervisor::new(dec!(10000), dec!(5));
        supervisor.record_equity(dec!(9600), 1).await; // 4% drawdown
        assert!(!supervisor.breaker_active().await);
    }

    #[tokio::test]
    async fn breaker_latches_once_threshold_crossed_and_stays_latched() {
        let supervisor = DrawdownSupervisor::new(dec!(10000), dec!(5));
        supervisor.record_equity(dec!(9400), 2).await; // 6% drawdown
        assert!(supervisor.breaker_active().await);

        // equity recovers fully, breaker must remain latched
        supervisor.record_equity(dec!(10500), 0).await;
        assert!(supervisor.breaker_active().await);
    }

    #[tokio::test]
    async fn peak_equity_only_ever_increases() {
        let supervisor = DrawdownSupervisor::new(dec!(10000), dec!(50));
        supervisor.record_equity(dec!(12000), 0).await;
        supervisor.record_equity(dec!(11000), 0).await;
        assert_eq!(supervisor.peak_equity().await, dec!(12000));
    }
}
