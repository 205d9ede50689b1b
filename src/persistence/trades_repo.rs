use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Text;
use sqlx::Row;

use crate::domain::errors::PersistenceError;
use crate::domain::ports::TradeRepository;
use crate::domain::signal::Direction;
use crate::domain::trade::{ExitReason, RunMode, Trade, TradeStatus};
use crate::domain::zone::ZoneRole;
use crate::persistence::database::Database;

pub struct SqliteTradeRepository {
    database: Database,
}

impl SqliteTradeRepository {
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

fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "buy",
        Direction::Sell => "sell",
    }
}

fn parse_direction(s: &str) -> Direction {
    if s == "buy" {
        Direction::Buy
    } else {
        Direction::Sell
    }
}

fn exit_reason_str(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::TakeProfit => "take_profit",
        ExitReason::StopLoss => "stop_loss",
        ExitReason::Manual => "manual",
        ExitReason::TrailingStop => "trailing_stop",
    }
}

fn parse_exit_reason(s: &str) -> ExitReason {
    match s {
        "take_profit" => ExitReason::TakeProfit,
        "stop_loss" => ExitReason::StopLoss,
        "trailing_stop" => ExitReason::TrailingStop,
        _ => ExitReason::Manual,
    }
}

fn zone_role_str(role: ZoneRole) -> &'static str {
    match role {
        ZoneRole::Support => "support",
        ZoneRole::Resistance => "resistance",
    }
}

fn parse_zone_role(s: &str) -> ZoneRole {
    if s == "support" {
        ZoneRole::Support
    } else {
        ZoneRole::Resistance
    }
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Result<Trade, PersistenceError> {
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "open" => TradeStatus::Open,
        "cancelled" => TradeStatus::Cancelled,
        _ => TradeStatus::Closed,
    };

    Ok(Trade {
        id: row.try_get("id")?,
        stream_name: row.try_get("stream_name")?,
        mode: parse_mode(&row.try_get::<String, _>("mode")?),
        direction: parse_direction(&row.try_get::<String, _>("direction")?),
        instrument: row.try_get("pair")?,
        entry_price: row.try_get::<Text<Decimal>, _>("entry_price")?.0,
        exit_price: row
            .try_get::<Option<Text<Decimal>>, _>("exit_price")?
            .map(|t| t.0),
        stop_loss: row.try_get::<Text<Decimal>, _>("stop_loss")?.0,
        take_profit: row.try_get::<Text<Decimal>, _>("take_profit")?.0,
        units: row.try_get::<Text<Decimal>, _>("units")?.0,
        zone_price: row
            .try_get::<Option<Text<Decimal>>, _>("sr_zone_price")?
            .map(|t| t.0),
        zone_role: row
            .try_get::<Option<String>, _>("sr_zone_type")?
            .map(|s| parse_zone_role(&s)),
        entry_reason: row.try_get("entry_reason")?,
        exit_reason: row
            .try_get::<Option<String>, _>("exit_reason")?
            .map(|s| parse_exit_reason(&s)),
        pnl: row
            .try_get::<Option<Text<Decimal>>, _>("pnl")?
            .map(|t| t.0),
        status,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn insert_open(&self, trade: &Trade) -> Result<i64, PersistenceError> {
        let row = sqlx::query(
            r#"
            INSERT INTO trades (
                stream_name, mode, direction, pair, entry_price, stop_loss,
                take_profit, units, sr_zone_price, sr_zone_type, entry_reason,
                status, opened_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'open', ?)
            RETURNING id
            "#,
        )
        .bind(&trade.stream_name)
        .bind(mode_str(trade.mode))
        .bind(direction_str(trade.direction))
        .bind(&trade.instrument)
        .bind(Text(trade.entry_price))
        .bind(Text(trade.stop_loss))
        .bind(Text(trade.take_profit))
        .bind(Text(trade.units))
        .bind(trade.zone_price.map(Text))
        .bind(trade.zone_role.map(zone_role_str))
        .bind(&trade.entry_reason)
        .bind(trade.opened_at)
        .fetch_one(&self.database.pool)
        .await?;

        Ok(row.try_get::<i64, _>("id")?)
    }

    async fn close(
        &self,
        id: i64,
        exit_price: Decimal,
        exit_reason: ExitReason,
        pnl: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE trades
            SET exit_price = ?, exit_reason = ?, pnl = ?, status = 'closed', closed_at = ?
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(Text(exit_price))
        .bind(exit_reason_str(exit_reason))
        .bind(Text(pnl))
        .bind(closed_at)
        .bind(id)
        .execute(&self.database.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::InvariantViolation(format!(
                "trade {id} is already closed or does not exist"
            )));
        }
        Ok(())
    }

    async fn find_open(&self, stream_name: &str) -> Result<Vec<Trade>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM trades WHERE status = 'open' AND stream_name = ?")
            .bind(stream_name)
            .fetch_all(&self.database.pool)
            .await?;
        rows.iter().map(row_to_trade).collect()
    }

    async fn find_recent_closed(&self, limit: usize) -> Result<Vec<Trade>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE status = 'closed' ORDER BY closed_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.database.pool)
        .await?;
        rows.iter().map(row_to_trade).collect()
    }
}
