use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Text;
use sqlx::Row;

use crate::domain::equity::EquitySnapshot;
use crate::domain::errors::PersistenceError;
use crate::domain::ports::EquitySnapshotRepository;
use crate::domain::trade::RunMode;
use crate::persistence::database::Database;

pub struct SqliteEquitySnapshotRepository {
    database: Database,
}

impl SqliteEquitySnapshotRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn mode_str(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Backtest => "backtest",
        RunMode::Paper => "paper",
        RunMode::Live => "live",
    }
}

fn parse_mode(s: &str) -> RunMode {
    match s {
        "backtest" => RunMode::Backtest,
        "live" => RunMode::Live,
        _ => RunMode::Paper,
    }
}

#[async_trait]
impl EquitySnapshotRepository for SqliteEquitySnapshotRepository {
    async fn append(&self, snapshot: &EquitySnapshot) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO equity_snapshots (
                mode, equity, balance, peak_equity, drawdown_pct, open_positions, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(mode_str(snapshot.mode))
        .bind(Text(snapshot.equity))
        .bind(Text(snapshot.balance))
        .bind(Text(snapshot.peak_equity))
        .bind(Text(snapshot.drawdown_pct))
        .bind(snapshot.open_position_count as i64)
        .bind(snapshot.recorded_at)
        .execute(&self.database.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EquitySnapshot>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM equity_snapshots ORDER BY recorded_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.database.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EquitySnapshot {
                    mode: parse_mode(&row.try_get::<String, _>("mode")?),
                    equity: row.try_get::<Text<Decimal>, _>("equity")?.0,
                    balance: row.try_get::<Text<Decimal>, _>("balance")?.0,
                    peak_equity: row.try_get::<Text<Decimal>, _>("peak_equity")?.0,
                    drawdown_pct: row.try_get::<Text<Decimal>, _>("drawdown_pct")?.0,
                    open_position_count: row.try_get::<i64, _>("open_positions")? as u32,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }
}
