//! Mean Reversion: fades Bollinger-band extremes inside a low-ADX range,
//! confirmed by RSI and structural zone proximity, filtered by H4 trend.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::Granularity;
use crate::domain::signal::{Direction, EntrySignal, GateDiagnostics, StrategyResult};
use crate::domain::zone::ZoneRole;
use crate::indicators::{adx, atr, bollinger, rsi};
use crate::risk::stops;
use crate::session;
use crate::strategies::trend::{h4_trend_bias, TrendBias};
use crate::strategies::{StrategyContext, TradingStrategy};
use crate::zones::detect_zones;

const GATES: &[&str] = &[
    "data_sufficiency",
    "session",
    "range_detection",
    "band_extreme",
    "oscillator_agreement",
    "zone_proximity",
    "trend_filter",
    "stop_target",
];

const MIN_H1_CANDLES: usize = 51;
const MIN_M15_CANDLES: usize = 29;
const H1_ADX_PERIOD: usize = 14;
const M15_BOLLINGER_PERIOD: usize = 20;
const M15_RSI_PERIOD: usize = 14;

pub struct MeanReversionConfig {
    pub pip: Decimal,
    pub adx_ceiling: Decimal,
    pub rsi_oversold: Decimal,
    pub rsi_overbought: Decimal,
    pub zone_proximity_pips: Decimal,
    pub zone_tolerance: Decimal,
    pub zone_min_strength: u32,
    pub atr_buffer_period: usize,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            pip: dec!(0.0001),
            adx_ceiling: dec!(25),
            rsi_oversold: dec!(30),
            rsi_overbought: dec!(70),
            zone_proximity_pips: dec!(15),
            zone_tolerance: dec!(0.0020),
            zone_min_strength: 2,
            atr_buffer_period: 14,
        }
    }
}

#[derive(Default)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self { config }
    }
}

impl TradingStrategy for MeanReversionStrategy {
    fn id(&self) -> &'static str {
        "mean_reversion"
    }

    fn gates(&self) -> &'static [&'static str] {
        GATES
    }

    fn evaluate(&self, ctx: &StrategyContext) -> StrategyResult {
        let mut diagnostics = GateDiagnostics::default();

        if !ctx.has_minimum(Granularity::H1, MIN_H1_CANDLES)
            || !ctx.has_minimum(Granularity::M15, MIN_M15_CANDLES)
            || !ctx.has_minimum(Granularity::H4, 51)
        {
            diagnostics.fail("data_sufficiency");
            return StrategyResult::veto("insufficient candle data", diagnostics);
        }
        diagnostics.record_pass("data_sufficiency");

        if !session::admits(ctx.config.session, ctx.evaluated_at) {
            diagnostics.fail("session");
            return StrategyResult::veto("outside session window", diagnostics);
        }
        diagnostics.record_pass("session");

        let h1 = ctx.series(Granularity::H1).unwrap();
        let m15 = ctx.series(Granularity::M15).unwrap();
        let h4 = ctx.series(Granularity::H4).unwrap();

        let h1_adx = match adx(h1, H1_ADX_PERIOD) {
            Some(v) => v,
            None => {
                diagnostics.fail("range_detection");
                return StrategyResult::veto("ADX unavailable", diagnostics);
            }
        };
        if h1_adx >= self.config.adx_ceiling {
            diagnostics.fail("range_detection");
            return StrategyResult::veto("market is trending, not ranging", diagnostics);
        }
        diagnostics.record_pass("range_detection");

        let (lower, middle, upper) = match bollinger(m15, M15_BOLLINGER_PERIOD, 2.0) {
            Some(bands) => bands,
            None => {
                diagnostics.fail("band_extreme");
                return StrategyResult::veto("Bollinger bands unavailable", diagnostics);
            }
        };
        let latest_close = m15.last().unwrap().close;
        let direction = if latest_close <= lower {
            Direction::Buy
        } else if latest_close >= upper {
            Direction::Sell
        } else {
            diagnostics.fail("band_extreme");
            return StrategyResult::veto("price not at a band extreme", diagnostics);
        };
        diagnostics.record_pass("band_extreme");

        let m15_rsi = match rsi(m15, M15_RSI_PERIOD) {
            Some(v) => v,
            None => {
                diagnostics.fail("oscillator_agreement");
                return StrategyResult::veto("RSI unavailable", diagnostics);
            }
        };
        let rsi_agrees = match direction {
            Direction::Buy => m15_rsi < self.config.rsi_oversold,
            Direction::Sell => m15_rsi > self.config.rsi_overbought,
        };
        if !rsi_agrees {
            diagnostics.fail("oscillator_agreement");
            return StrategyResult::veto("oscillator does not agree with band extreme", diagnostics);
        }
        diagnostics.record_pass("oscillator_agreement");

        let zones = detect_zones(
            h1,
            self.config.zone_tolerance,
            self.config.zone_min_strength,
            ctx.evaluated_at,
        );
        let target_role = match direction {
            Direction::Buy => ZoneRole::Support,
            Direction::Sell => ZoneRole::Resistance,
        };
        let nearby_zone = zones
            .iter()
            .filter(|z| z.role == target_role)
            .min_by_key(|z| (z.level - latest_close).abs())
            .filter(|z| {
                (z.level - latest_close).abs() <= self.config.zone_proximity_pips * self.config.pip
            });
        let zone = match nearby_zone {
            Some(z) => z,
            None => {
                diagnostics.fail("zone_proximity");
                return StrategyResult::veto("no structural zone nearby", diagnostics);
            }
        };
        diagnostics.record_pass("zone_proximity");

        let trend = match h4_trend_bias(h4) {
            Some(t) => t,
            None => {
                diagnostics.fail("trend_filter");
                return StrategyResult::veto("trend indicators unavailable", diagnostics);
            }
        };
        let counter_trend = matches!(
            (trend, direction),
            (TrendBias::Bullish, Direction::Sell) | (TrendBias::Bearish, Direction::Buy)
        );
        if counter_trend {
            diagnostics.fail("trend_filter");
            return StrategyResult::veto("signal direction opposes H4 trend", diagnostics);
        }
        diagnostics.record_pass("trend_filter");

        let atr_buffer = match atr(h1, self.config.atr_buffer_period) {
            Some(v) => v,
            None => {
                diagnostics.fail("stop_target");
                return StrategyResult::veto("ATR unavailable", diagnostics);
            }
        };

        let entry = latest_close;
        let (stop, target) = stops::mean_reversion(
            entry,
            direction,
            zone.level,
            atr_buffer,
            middle,
            self.config.pip,
        );
        diagnostics.record_pass("stop_target");

        StrategyResult::Signal(EntrySignal {
            direction,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            zone: Some(zone.clone()),
            reason: format!("{direction} mean reversion from band extreme near {}", zone.level),
            stream: ctx.config.name.clone(),
            evaluated_at: ctx.evaluated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;
    use crate::domain::stream_config::{SessionWindow, StreamConfig};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    fn stream_config() -> StreamConfig {
        StreamConfig {
            name: "reversion-stream".to_string(),
            instrument: "EUR_USD".to_string(),
            strategy_id: "mean_reversion".to_string(),
            granularities: vec![Granularity::H1, Granularity::M15, Granularity::H4],
            poll_interval: Duration::from_secs(900),
            risk_percent_per_trade: dec!(1),
            max_concurrent_positions: 1,
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
        let result = MeanReversionStrategy::default().evaluate(&ctx);
        assert!(!result.is_signal());
    }

    #[test]
    fn vetoes_when_trending_per_adx() {
        let h1: Vec<Candle> = (0..MIN_H1_CANDLES as i64)
            .map(|i| Candle {
                instrument: "EUR_USD".to_string(),
                granularity: Granularity::H1,
                timestamp: Utc.timestamp_opt(i * 3600, 0).unwrap(),
                open: Decimal::from_f64_retain(1.10 + i as f64 * 0.001).unwrap(),
                high: Decimal::from_f64_retain(1.101 + i as f64 * 0.001).unwrap(),
                low: Decimal::from_f64_retain(1.099 + i as f64 * 0.001).unwrap(),
                close: Decimal::from_f64_retain(1.1005 + i as f64 * 0.001).unwrap(),
                volume: dec!(1000),
            })
            .collect();
        let m15: Vec<Candle> = (0..MIN_M15_CANDLES as i64)
            .map(|i| Candle {
                instrument: "EUR_USD".to_string(),
                granularity: Granularity::M15,
                timestamp: Utc.timestamp_opt(i * 900, 0).unwrap(),
                open: dec!(1.1000),
                high: dec!(1.1005),
                low: dec!(1.0995),
                close: dec!(1.1000),
                volume: dec!(1000),
            })
            .collect();
        let h4: Vec<Candle> = (0..51)
            .map(|i| Candle {
                instrument: "EUR_USD".to_string(),
                granularity: Granularity::H4,
                timestamp: Utc.timestamp_opt(i * 14400, 0).unwrap(),
                open: dec!(1.1000),
                high: dec!(1.1010),
                low: dec!(1.0990),
                close: dec!(1.1000),
                volume: dec!(1000),
            })
            .collect();

        let mut candles = HashMap::new();
        candles.insert(Granularity::H1, h1);
        candles.insert(Granularity::M15, m15);
        candles.insert(Granularity::H4, h4);

        let ctx = StrategyContext {
            config: stream_config(),
            candles,
            evaluated_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        };
        let result = MeanReversionStrategy::default().evaluate(&ctx);
        assert!(!result.is_signal());
    }
}
