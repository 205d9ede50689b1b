use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::fs;
use tracing::info;

/// Owns the connection pool and bootstraps the schema idempotently on
/// construction. Cloning is cheap — `SqlitePool` is itself a handle.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)
                        .await
                        .context("failed to create database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        info!(db_url, "connected to persistence backend");

        let db = Self { pool };
        db.bootstrap().await?;
        Ok(db)
    }

    /// Applies the canonical schema. Every statement is `IF NOT EXISTS`, so
    /// this is safe to run on every process start regardless of prior state.
    async fn bootstrap(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream_name TEXT NOT NULL,
                mode TEXT NOT NULL,
                direction TEXT NOT NULL,
                pair TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT,
                stop_loss TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                units TEXT NOT NULL,
                sr_zone_price TEXT,
                sr_zone_type TEXT,
                entry_reason TEXT NOT NULL,
                exit_reason TEXT,
                pnl TEXT,
                status TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create trades table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_status ON trades (status);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_opened_at ON trades (opened_at);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_mode ON trades (mode);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_stream_name ON trades (stream_name);")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equity_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mode TEXT NOT NULL,
                equity TEXT NOT NULL,
                balance TEXT NOT NULL,
                peak_equity TEXT NOT NULL,
                drawdown_pct TEXT NOT NULL,
                open_positions INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create equity_snapshots table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_equity_recorded_at ON equity_snapshots (recorded_at);",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sr_zones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair TEXT NOT NULL,
                zone_type TEXT NOT NULL,
                price_level TEXT NOT NULL,
                strength INTEGER NOT NULL,
                detected_at TEXT NOT NULL,
                invalidated_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create sr_zones table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_zones_pair_type ON sr_zones (pair, zone_type);")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_zones_active ON sr_zones (pair, zone_type) WHERE invalidated_at IS NULL;",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                win_rate TEXT NOT NULL,
                profit_factor TEXT NOT NULL,
                sharpe_ratio TEXT NOT NULL,
                max_drawdown TEXT NOT NULL,
                net_pnl TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create backtest_runs table")?;

        Ok(())
    }
}
