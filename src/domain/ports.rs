use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::candle::{Candle, Granularity};
use crate::domain::equity::{AccountState, EquitySnapshot};
use crate::domain::errors::{BrokerError, PersistenceError};
use crate::domain::trade::Trade;
use crate::domain::zone::Zone;

#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub instrument: String,
    pub direction: crate::domain::signal::Direction,
    pub units: Decimal,
    pub avg_price: Decimal,
    pub stop: Option<Decimal>,
    pub target: Option<Decimal>,
    pub open_time: DateTime<Utc>,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub fill_price: Decimal,
    pub open_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CloseAck {
    pub exit_price: Decimal,
    pub close_time: DateTime<Utc>,
}

/// Abstract contract the core depends on; the concrete HTTP client is an
/// external collaborator out of scope for this crate.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Most recent `count` candles, oldest first. The caller discards the
    /// last (possibly incomplete) candle.
    async fn fetch_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError>;

    async fn get_account(&self) -> Result<AccountState, BrokerError>;

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    async fn place_order(
        &self,
        instrument: &str,
        units_signed: Decimal,
        stop_price: Decimal,
        target_price: Decimal,
    ) -> Result<OrderAck, BrokerError>;

    async fn close_order(&self, order_id: &str) -> Result<CloseAck, BrokerError>;

    async fn modify_order(&self, order_id: &str, new_stop: Decimal) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn insert_open(&self, trade: &Trade) -> Result<i64, PersistenceError>;
    async fn close(
        &self,
        id: i64,
        exit_price: Decimal,
        exit_reason: crate::domain::trade::ExitReason,
        pnl: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
    async fn find_open(&self, stream_name: &str) -> Result<Vec<Trade>, PersistenceError>;
    async fn find_recent_closed(&self, limit: usize) -> Result<Vec<Trade>, PersistenceError>;
}

#[async_trait]
pub trait EquitySnapshotRepository: Send + Sync {
    async fn append(&self, snapshot: &EquitySnapshot) -> Result<(), PersistenceError>;
    async fn recent(&self, limit: usize) -> Result<Vec<EquitySnapshot>, PersistenceError>;
}

#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn append_many(
        &self,
        instrument: &str,
        zones: &[Zone],
        detected_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone)]
pub struct BacktestRunRecord {
    pub instrument: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stats: crate::backtest::BacktestStats,
}

#[async_trait]
pub trait BacktestRunRepository: Send + Sync {
    async fn save(&self, record: &BacktestRunRecord) -> Result<i64, PersistenceError>;
}
