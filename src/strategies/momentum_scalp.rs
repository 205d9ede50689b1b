//! Momentum Scalp: trades short bursts of M5 momentum confirmed by an M1
//! candlestick pattern, exited via the trailing-stop engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::{Candle, Granularity};
use crate::domain::signal::{Direction, EntrySignal, GateDiagnostics, StrategyResult};
use crate::indicators::{atr, ema, swing_highs, swing_lows};
use crate::risk::stops;
use crate::session;
use crate::strategies::{StrategyContext, TradingStrategy};

const GATES: &[&str] = &[
    "data_sufficiency",
    "session",
    "momentum_bias",
    "volatility",
    "spread",
    "pullback",
    "confirmation_pattern",
    "stop_target",
];

const MOMENTUM_LOOKBACK: usize = 15;
const M5_ATR_PERIOD: usize = 14;
const M1_SPREAD_LOOKBACK: usize = 20;
const M5_EMA_PERIOD: usize = 9;
const SESSION_END_BUFFER_MINUTES: i64 = 30;
const SWING_WINDOW: usize = 2;

pub struct MomentumScalpConfig {
    pub pip: Decimal,
    pub atr_floor_pips: Decimal,
    pub spread_ceiling_pips: Decimal,
    pub pullback_distance_pips: Decimal,
    pub swing_offset_pips: Decimal,
}

impl Default for MomentumScalpConfig {
    fn default() -> Self {
        Self {
            pip: dec!(0.0001),
            atr_floor_pips: dec!(8),
            spread_ceiling_pips: dec!(3),
            pullback_distance_pips: dec!(5),
            swing_offset_pips: dec!(30),
        }
    }
}

#[derive(Default)]
pub struct MomentumScalpStrategy {
    config: MomentumScalpConfig,
}

impl MomentumScalpStrategy {
    pub fn new(config: MomentumScalpConfig) -> Self {
        Self { config }
    }

    fn is_bullish(c: &Candle) -> bool {
        c.close > c.open
    }

    fn is_bearish(c: &Candle) -> bool {
        c.close < c.open
    }

    fn momentum_bias(&self, m5: &[Candle]) -> Option<Direction> {
        let window = &m5[m5.len() - MOMENTUM_LOOKBACK..];
        let bullish_count = window.iter().filter(|c| Self::is_bullish(c)).count();
        let bearish_count = window.iter().filter(|c| Self::is_bearish(c)).count();
        let move_size = window.last().unwrap().close - window.first().unwrap().close;
        let threshold = Decimal::from(MOMENTUM_LOOKBACK) * dec!(0.6);

        if Decimal::from(bullish_count) >= threshold && move_size >= self.config.pip {
            Some(Direction::Buy)
        } else if Decimal::from(bearish_count) >= threshold && -move_size >= self.config.pip {
            Some(Direction::Sell)
        } else {
            None
        }
    }

    fn confirmation_pattern(m5: &[Candle], direction: Direction) -> bool {
        let n = m5.len();
        if n < 2 {
            return false;
        }
        let prev = &m5[n - 2];
        let cur = &m5[n - 1];
        let bullish = direction == Direction::Buy;

        let directionally_aligned = if bullish {
            Self::is_bullish(cur)
        } else {
            Self::is_bearish(cur)
        };
        if !directionally_aligned {
            return false;
        }

        let engulfing = cur.body() > prev.body()
            && if bullish {
                cur.open <= prev.close && cur.close >= prev.open
            } else {
                cur.open >= prev.close && cur.close <= prev.open
            };

        let tail_shadow = if bullish {
            cur.lower_shadow()
        } else {
            cur.upper_shadow()
        };
        let hammer_or_pin = tail_shadow >= Decimal::from(2) * cur.body();

        let two_in_a_row = if bullish {
            Self::is_bullish(prev)
        } else {
            Self::is_bearish(prev)
        };

        let strong_body = cur.range() > Decimal::ZERO && cur.body() >= dec!(0.6) * cur.range();

        engulfing || hammer_or_pin || two_in_a_row || strong_body
    }
}

impl TradingStrategy for MomentumScalpStrategy {
    fn id(&self) -> &'static str {
        "momentum_scalp"
    }

    fn gates(&self) -> &'static [&'static str] {
        GATES
    }

    fn evaluate(&self, ctx: &StrategyContext) -> StrategyResult {
        let mut diagnostics = GateDiagnostics::default();

        if !ctx.has_minimum(Granularity::M5, MOMENTUM_LOOKBACK.max(M5_ATR_PERIOD + 1))
            || !ctx.has_minimum(Granularity::M1, M1_SPREAD_LOOKBACK)
        {
            diagnostics.fail("data_sufficiency");
            return StrategyResult::veto("insufficient candle data", diagnostics);
        }
        diagnostics.record_pass("data_sufficiency");

        if !session::admits(ctx.config.session, ctx.evaluated_at)
            || session::within_end_buffer(
                ctx.config.session,
                ctx.evaluated_at,
                SESSION_END_BUFFER_MINUTES,
            )
        {
            diagnostics.fail("session");
            return StrategyResult::veto("outside session window or within end buffer", diagnostics);
        }
        diagnostics.record_pass("session");

        let m5 = ctx.series(Granularity::M5).unwrap();
        let m1 = ctx.series(Granularity::M1).unwrap();

        let direction = match self.momentum_bias(m5) {
            Some(d) => d,
            None => {
                diagnostics.fail("momentum_bias");
                return StrategyResult::veto("no clear momentum bias", diagnostics);
            }
        };
        diagnostics.record_pass("momentum_bias");
        diagnostics.field("bias_direction", direction);

        let m5_atr = match atr(m5, M5_ATR_PERIOD) {
            Some(v) => v,
            None => {
                diagnostics.fail("volatility");
                return StrategyResult::veto("ATR unavailable", diagnostics);
            }
        };
        if m5_atr < self.config.atr_floor_pips * self.config.pip {
            diagnostics.fail("volatility");
            return StrategyResult::veto("volatility below floor", diagnostics);
        }
        diagnostics.record_pass("volatility");

        let recent_m1 = &m1[m1.len() - M1_SPREAD_LOOKBACK..];
        let min_range = recent_m1.iter().map(|c| c.range()).min().unwrap();
        if min_range > self.config.spread_ceiling_pips * self.config.pip {
            diagnostics.fail("spread");
            return StrategyResult::veto("spread proxy above ceiling", diagnostics);
        }
        diagnostics.record_pass("spread");

        let m5_ema9 = match ema(m5, M5_EMA_PERIOD) {
            Some(v) => v,
            None => {
                diagnostics.fail("pullback");
                return StrategyResult::veto("EMA unavailable", diagnostics);
            }
        };
        let latest_close = m5.last().unwrap().close;
        if (latest_close - m5_ema9).abs() > self.config.pullback_distance_pips * self.config.pip {
            diagnostics.fail("pullback");
            return StrategyResult::veto("price too far from pullback EMA", diagnostics);
        }
        diagnostics.record_pass("pullback");

        if !Self::confirmation_pattern(m5, direction) {
            diagnostics.fail("confirmation_pattern");
            return StrategyResult::veto("no confirmation pattern", diagnostics);
        }
        diagnostics.record_pass("confirmation_pattern");

        let swing_indices = match direction {
            Direction::Buy => swing_lows(m5, SWING_WINDOW),
            Direction::Sell => swing_highs(m5, SWING_WINDOW),
        };
        let swing_extreme = match swing_indices.last() {
            Some(&idx) => match direction {
                Direction::Buy => m5[idx].low,
                Direction::Sell => m5[idx].high,
            },
            None => match direction {
                Direction::Buy => m5.last().unwrap().low,
                Direction::Sell => m5.last().unwrap().high,
            },
        };

        let entry = latest_close;
        let (stop, target) = stops::momentum_scalp(
            entry,
            direction,
            swing_extreme,
            self.config.swing_offset_pips,
            self.config.pip,
        );
        diagnostics.record_pass("stop_target");

        StrategyResult::Signal(EntrySignal {
            direction,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            zone: None,
            reason: format!("{direction} momentum scalp confirmed on M1/M5"),
            stream: ctx.config.name.clone(),
            evaluated_at: ctx.evaluated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream_config::{SessionWindow, StreamConfig};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    fn stream_config() -> StreamConfig {
        StreamConfig {
            name: "scalp-stream".to_string(),
            instrument: "EUR_USD".to_string(),
            strategy_id: "momentum_scalp".to_string(),
            granularities: vec![Granularity::M1, Granularity::M5],
            poll_interval: Duration::from_secs(30),
            risk_percent_per_trade: dec!(0.5),
            max_concurrent_positions: 2,
            target_rr: None,
            session: SessionWindow::all_day(),
            enabled: true,
        }
    }

    #[test]
    fn vetoes_with_insufficient_data() {
        let ctx = StrategyContext {
            config: stream_config(),
            candles: HashMap::new(),
            evaluated_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        };
        let result = MomentumScalpStrategy::default().evaluate(&ctx);
        assert!(!result.is_signal());
    }
}
