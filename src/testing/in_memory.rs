//! In-memory repository implementations for engine and backtest tests —
//! same trait contracts as the Sqlite repositories, no I/O.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::equity::EquitySnapshot;
use crate::domain::errors::PersistenceError;
use crate::domain::ports::{
    BacktestRunRecord, BacktestRunRepository, EquitySnapshotRepository, TradeRepository,
    ZoneRepository,
};
use crate::domain::trade::{ExitReason, Trade};
use crate::domain::zone::Zone;

#[derive(Default)]
pub struct InMemoryTradeRepository {
    trades: Mutex<Vec<Trade>>,
    next_id: Mutex<i64>,
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn insert_open(&self, trade: &Trade) -> Result<i64, PersistenceError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;

        let mut stored = trade.clone();
        stored.id = id;
        self.trades.lock().unwrap().push(stored);
        Ok(id)
    }

    async fn close(
        &self,
        id: i64,
        exit_price: Decimal,
        exit_reason: ExitReason,
        pnl: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut trades = self.trades.lock().unwrap();
        let trade = trades
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PersistenceError::InvariantViolation(format!("trade {id} not found")))?;
        trade
            .close(exit_price, exit_reason, closed_at)
            .map_err(|e| PersistenceError::InvariantViolation(e.to_string()))
    }

    async fn find_open(&self, stream_name: &str) -> Result<Vec<Trade>, PersistenceError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.stream_name == stream_name && t.status == crate::domain::trade::TradeStatus::Open)
            .cloned()
            .collect())
    }

    async fn find_recent_closed(&self, limit: usize) -> Result<Vec<Trade>, PersistenceError> {
        let mut closed: Vec<Trade> = self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.status == crate::domain::trade::TradeStatus::Closed)
            .cloned()
            .collect();
        closed.sort_by_key(|t| std::cmp::Reverse(t.closed_at));
        closed.truncate(limit);
        Ok(closed)
    }
}

#[derive(Default)]
pub struct InMemoryEquitySnapshotRepository {
    snapshots: Mutex<Vec<EquitySnapshot>>,
}

#[async_trait]
impl EquitySnapshotRepository for InMemoryEquitySnapshotRepository {
    async fn append(&self, snapshot: &EquitySnapshot) -> Result<(), PersistenceError> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EquitySnapshot>, PersistenceError> {
        let snapshots = self.snapshots.lock().unwrap();
        let start = snapshots.len().saturating_sub(limit);
        Ok(snapshots[start..].to_vec())
    }
}

#[derive(Default)]
pub struct InMemoryZoneRepository {
    zones: Mutex<Vec<(String, Zone, DateTime<Utc>)>>,
}

#[async_trait]
impl ZoneRepository for InMemoryZoneRepository {
    async fn append_many(
        &self,
        instrument: &str,
        zones: &[Zone],
        detected_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut stored = self.zones.lock().unwrap();
        for zone in zones {
            stored.push((instrument.to_string(), zone.clone(), detected_at));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBacktestRunRepository {
    runs: Mutex<Vec<BacktestRunRecord>>,
    next_id: Mutex<i64>,
}

#[async_trait]
impl BacktestRunRepository for InMemoryBacktestRunRepository {
    async fn save(&self, record: &BacktestRunRecord) -> Result<i64, PersistenceError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        self.runs.lock().unwrap().push(record.clone());
        Ok(*next_id)
    }
}
