//! Backtest Runner: replays a bounded historical candle set through the same
//! strategy pipeline and risk engine as live trading, routing order
//! placement to a synthetic fill/exit model instead of a broker.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::candle::{Candle, Granularity};
use crate::domain::signal::{Direction, StrategyResult};
use crate::domain::stream_config::StreamConfig;
use crate::domain::trade::ExitReason;
use crate::risk::sizing::size_position;
use crate::strategies::{StrategyContext, TradingStrategy};

/// Mirrors the `backtest_runs` table column set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: Decimal,
    pub profit_factor: Decimal,
    pub sharpe_ratio: Decimal,
    pub max_drawdown: Decimal,
    pub net_pnl: Decimal,
}

struct ClosedTrade {
    pnl: Decimal,
    return_pct: Decimal,
}

/// Scans `bars` in chronological order for the first bar whose range
/// contains the stop or the target. Stop is checked before target within
/// the same bar (pessimism rule). Returns `(exit_price, reason, at)`.
pub fn resolve_exit(
    direction: Direction,
    stop: Decimal,
    target: Decimal,
    bars: &[Candle],
) -> Option<(Decimal, ExitReason, DateTime<Utc>)> {
    for bar in bars {
        let stop_hit = match direction {
            Direction::Buy => bar.low <= stop,
            Direction::Sell => bar.high >= stop,
        };
        if stop_hit {
            return Some((stop, ExitReason::StopLoss, bar.timestamp));
        }
        let target_hit = match direction {
            Direction::Buy => bar.high >= target,
            Direction::Sell => bar.low <= target,
        };
        if target_hit {
            return Some((target, ExitReason::TakeProfit, bar.timestamp));
        }
    }
    None
}

fn truncate_to(series: &[Candle], ts: DateTime<Utc>) -> Vec<Candle> {
    series.iter().take_while(|c| c.timestamp <= ts).cloned().collect()
}

fn finest(granularities: &[Granularity]) -> Granularity {
    fn rank(g: Granularity) -> u8 {
        match g {
            Granularity::M1 => 0,
            Granularity::M5 => 1,
            Granularity::M15 => 2,
            Granularity::H1 => 3,
            Granularity::H4 => 4,
            Granularity::D1 => 5,
        }
    }
    *granularities.iter().min_by_key(|g| rank(**g)).unwrap_or(&Granularity::M5)
}

pub struct BacktestParams {
    pub starting_equity: Decimal,
    pub pip: Decimal,
    pub pip_value: Decimal,
    pub unit_step: Decimal,
    pub warmup_bars: usize,
}

impl Default for BacktestParams {
    fn default() -> Self {
        Self {
            starting_equity: dec!(10000),
            pip: dec!(0.0001),
            pip_value: dec!(0.0001),
            unit_step: dec!(1),
            warmup_bars: 60,
        }
    }
}

pub struct BacktestRunner;

impl BacktestRunner {
    /// Drives `strategy` bar-by-bar over the finest configured granularity,
    /// opening at most one position at a time, filling at the next bar's
    /// open, and exiting per `resolve_exit`.
    pub fn run(
        strategy: &dyn TradingStrategy,
        config: &StreamConfig,
        candles: &HashMap<Granularity, Vec<Candle>>,
        params: &BacktestParams,
    ) -> BacktestStats {
        let primary_granularity = finest(&config.granularities);
        let primary = match candles.get(&primary_granularity) {
            Some(series) => series.clone(),
            None => return empty_stats(),
        };

        let mut equity = params.starting_equity;
        let mut peak_equity = equity;
        let mut max_drawdown = Decimal::ZERO;
        let mut closed: Vec<ClosedTrade> = Vec::new();

        let mut i = params.warmup_bars.min(primary.len());
        while i + 1 < primary.len() {
            let as_of = primary[i].timestamp;
            let ctx = StrategyContext {
                config: config.clone(),
                candles: candles
                    .iter()
                    .map(|(g, series)| (*g, truncate_to(series, as_of)))
                    .collect(),
                evaluated_at: as_of,
            };

            let result = strategy.evaluate(&ctx);
            let signal = match result {
                StrategyResult::Signal(signal) => signal,
                StrategyResult::Veto { .. } => {
                    i += 1;
                    continue;
                }
            };

            let units = match size_position(
                equity,
                config.risk_percent_per_trade,
                signal.entry_price,
                signal.stop_loss,
                params.pip,
                params.pip_value,
                params.unit_step,
            ) {
                Ok(units) => units,
                Err(_) => {
                    i += 1;
                    continue;
                }
            };

            let fill_price = primary[i + 1].open;
            let remaining_bars = &primary[i + 1..];
            let exit = resolve_exit(signal.direction, signal.stop_loss, signal.take_profit, remaining_bars);

            let (exit_price, bars_consumed) = match exit {
                Some((price, _, _)) => (price, remaining_bars.len()),
                None => (primary.last().unwrap().close, remaining_bars.len()),
            };

            let pnl = match signal.direction {
                Direction::Buy => (exit_price - fill_price) * units,
                Direction::Sell => (fill_price - exit_price) * units,
            };
            let risk_cash = equity * config.risk_percent_per_trade / Decimal::from(100);
            let return_pct = if risk_cash.is_zero() {
                Decimal::ZERO
            } else {
                pnl / risk_cash
            };

            equity += pnl;
            peak_equity = peak_equity.max(equity);
            if peak_equity > Decimal::ZERO {
                let drawdown = (peak_equity - equity) / peak_equity * Decimal::from(100);
                max_drawdown = max_drawdown.max(drawdown);
            }
            closed.push(ClosedTrade { pnl, return_pct });

            i += bars_consumed.max(1);
        }

        summarize(closed, max_drawdown)
    }
}

fn empty_stats() -> BacktestStats {
    BacktestStats {
        total_trades: 0,
        winning_trades: 0,
        losing_trades: 0,
        win_rate: Decimal::ZERO,
        profit_factor: Decimal::ZERO,
        sharpe_ratio: Decimal::ZERO,
        max_drawdown: Decimal::ZERO,
        net_pnl: Decimal::ZERO,
    }
}

fn summarize(trades: Vec<ClosedTrade>, max_drawdown: Decimal) -> BacktestStats {
    if trades.is_empty() {
        return empty_stats();
    }

    let total_trades = trades.len() as u32;
    let winning_trades = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count() as u32;
    let losing_trades = total_trades - winning_trades;

    let gross_win: Decimal = trades.iter().filter(|t| t.pnl > Decimal::ZERO).map(|t| t.pnl).sum();
    let gross_loss: Decimal = trades
        .iter()
        .filter(|t| t.pnl < Decimal::ZERO)
        .map(|t| -t.pnl)
        .sum();
    let net_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();

    let win_rate = Decimal::from(winning_trades) / Decimal::from(total_trades) * Decimal::from(100);
    let profit_factor = if gross_loss.is_zero() {
        gross_win
    } else {
        gross_win / gross_loss
    };

    let mean_return =
        trades.iter().map(|t| t.return_pct).sum::<Decimal>() / Decimal::from(total_trades);
    let variance = trades
        .iter()
        .map(|t| (t.return_pct - mean_return) * (t.return_pct - mean_return))
        .sum::<Decimal>()
        / Decimal::from(total_trades);
    let sharpe_ratio = if variance.is_zero() {
        Decimal::ZERO
    } else {
        mean_return / sqrt_decimal(variance)
    };

    BacktestStats {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        profit_factor,
        sharpe_ratio,
        max_drawdown,
        net_pnl,
    }
}

fn sqrt_decimal(value: Decimal) -> Decimal {
    use rust_decimal::prelude::ToPrimitive;
    Decimal::from_f64_retain(value.to_f64().unwrap_or(0.0).sqrt()).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(low: f64, high: f64, idx: i64) -> Candle {
        Candle {
            instrument: "EUR_USD".to_string(),
            granularity: Granularity::M5,
            timestamp: Utc.timestamp_opt(idx * 300, 0).unwrap(),
            open: Decimal::from_f64_retain((low + high) / 2.0).unwrap(),
            high: Decimal::from_f64_retain(high).unwrap(),
            low: Decimal::from_f64_retain(low).unwrap(),
            close: Decimal::from_f64_retain((low + high) / 2.0).unwrap(),
            volume: dec!(1000),
        }
    }

    /// S6. Entry 1.20000, SL 1.19800, TP 1.20400; bar t+1 low 1.19750, high
    /// 1.20100 contains both stop and target -> stop wins (pessimism).
    #[test]
    fn s6_stop_checked_before_target_in_same_bar() {
        let bars = vec![bar(1.19750, 1.20100, 1)];
        let (exit_price, reason, _) =
            resolve_exit(Direction::Buy, dec!(1.19800), dec!(1.20400), &bars).unwrap();
        assert_eq!(exit_price, dec!(1.19800));
        assert_eq!(reason, ExitReason::StopLoss);
    }

    #[test]
    fn target_wins_when_stop_not_touched() {
        let bars = vec![bar(1.19900, 1.20450, 1)];
        let (exit_price, reason, _) =
            resolve_exit(Direction::Buy, dec!(1.19800), dec!(1.20400), &bars).unwrap();
        assert_eq!(exit_price, dec!(1.20400));
        assert_eq!(reason, ExitReason::TakeProfit);
    }

    #[test]
    fn no_exit_when_neither_level_is_touched() {
        let bars = vec![bar(1.19900, 1.20100, 1)];
        assert!(resolve_exit(Direction::Buy, dec!(1.19800), dec!(1.20400), &bars).is_none());
    }
}
