//! Deterministic broker double for engine and integration tests. No network,
//! no clock — candles and fills are scripted in advance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::candle::{Candle, Granularity};
use crate::domain::equity::AccountState;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{BrokerClient, BrokerPosition, CloseAck, OrderAck};
use crate::domain::signal::Direction;

struct MockState {
    account: AccountState,
    positions: HashMap<String, BrokerPosition>,
    next_fill_price: Decimal,
    next_event_time: DateTime<Utc>,
    fail_next_order: Option<BrokerError>,
}

/// Scripted broker: candles are preloaded per (instrument, granularity);
/// orders fill immediately at `next_fill_price`; positions close on demand.
pub struct MockBroker {
    candles: HashMap<(String, Granularity), Vec<Candle>>,
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new(starting_equity: Decimal) -> Self {
        Self {
            candles: HashMap::new(),
            state: Mutex::new(MockState {
                account: AccountState {
                    equity: starting_equity,
                    balance: starting_equity,
                    unrealised_pnl: Decimal::ZERO,
                    open_position_count: 0,
                    drawdown_pct: Decimal::ZERO,
                },
                positions: HashMap::new(),
                next_fill_price: Decimal::ZERO,
                next_event_time: DateTime::UNIX_EPOCH,
                fail_next_order: None,
            }),
        }
    }

    pub fn with_candles(mut self, instrument: &str, granularity: Granularity, candles: Vec<Candle>) -> Self {
        self.candles.insert((instrument.to_string(), granularity), candles);
        self
    }

    pub fn set_next_fill_price(&self, price: Decimal) {
        self.state.lock().unwrap().next_fill_price = price;
    }

    pub fn set_next_event_time(&self, at: DateTime<Utc>) {
        self.state.lock().unwrap().next_event_time = at;
    }

    pub fn queue_order_failure(&self, error: BrokerError) {
        self.state.lock().unwrap().fail_next_order = Some(error);
    }

    pub fn set_equity(&self, equity: Decimal) {
        self.state.lock().unwrap().account.equity = equity;
    }

    /// Simulates every open position having been closed externally by the
    /// broker (e.g. a stop or target fill) without going through
    /// `close_order` — the engine must detect this on its next reconcile.
    pub fn clear_all_positions(&self) {
        let mut state = self.state.lock().unwrap();
        state.positions.clear();
        state.account.open_position_count = 0;
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn fetch_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let series = self
            .candles
            .get(&(instrument.to_string(), granularity))
            .cloned()
            .unwrap_or_default();
        let start = series.len().saturating_sub(count);
        Ok(series[start..].to_vec())
    }

    async fn get_account(&self) -> Result<AccountState, BrokerError> {
        Ok(self.state.lock().unwrap().account)
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self.state.lock().unwrap().positions.values().cloned().collect())
    }

    async fn place_order(
        &self,
        instrument: &str,
        units_signed: Decimal,
        stop_price: Decimal,
        target_price: Decimal,
    ) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next_order.take() {
            return Err(err);
        }

        let order_id = Uuid::new_v4().to_string();
        let fill_price = state.next_fill_price;
        let event_time = state.next_event_time;
        let direction = if units_signed.is_sign_positive() {
            Direction::Buy
        } else {
            Direction::Sell
        };

        state.positions.insert(
            order_id.clone(),
            BrokerPosition {
                instrument: instrument.to_string(),
                direction,
                units: units_signed.abs(),
                avg_price: fill_price,
                stop: Some(stop_price),
                target: Some(target_price),
                open_time: event_time,
                unrealized_pnl: Decimal::ZERO,
            },
        );
        state.account.open_position_count = state.positions.len() as u32;

        Ok(OrderAck {
            order_id,
            fill_price,
            open_time: event_time,
        })
    }

    async fn close_order(&self, order_id: &str) -> Result<CloseAck, BrokerError> {
        let mut state = self.state.lock().unwrap();
        let event_time = state.next_event_time;
        let position = state
            .positions
            .remove(order_id)
            .ok_or_else(|| BrokerError::Permanent(format!("unknown order {order_id}")))?;
        state.account.open_position_count = state.positions.len() as u32;
        Ok(CloseAck {
            exit_price: position.avg_price,
            close_time: event_time,
        })
    }

    async fn modify_order(&self, order_id: &str, new_stop: Decimal) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .positions
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::Permanent(format!("unknown order {order_id}")))?;
        position.stop = Some(new_stop);
        Ok(())
    }
}
