use async_trait::async_trait;

use crate::domain::errors::PersistenceError;
use crate::domain::ports::{BacktestRunRecord, BacktestRunRepository};
use crate::persistence::database::Database;

pub struct SqliteBacktestRunRepository {
    database: Database,
}

impl SqliteBacktestRunRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl BacktestRunRepository for SqliteBacktestRunRepository {
    async fn save(&self, record: &BacktestRunRecord) -> Result<i64, PersistenceError> {
        let row = sqlx::query(
            r#"
            INSERT INTO backtest_runs (
                pair, start_date, end_date, total_trades, winning_trades,
                losing_trades, win_rate, profit_factor, sharpe_ratio,
                max_drawdown, net_pnl
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.instrument)
        .bind(record.start)
        .bind(record.end)
        .bind(record.stats.total_trades as i64)
        .bind(record.stats.winning_trades as i64)
        .bind(record.stats.losing_trades as i64)
        .bind(sqlx::types::Text(record.stats.win_rate))
        .bind(sqlx::types::Text(record.stats.profit_factor))
        .bind(sqlx::types::Text(record.stats.sharpe_ratio))
        .bind(sqlx::types::Text(record.stats.max_drawdown))
        .bind(sqlx::types::Text(record.stats.net_pnl))
        .fetch_one(&self.database.pool)
        .await?;

        use sqlx::Row;
        Ok(row.try_get::<i64, _>("id")?)
    }
}
