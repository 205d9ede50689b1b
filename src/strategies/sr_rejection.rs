//! S/R Rejection: trades a rejection wick off a daily support/resistance
//! zone, filtered by the prevailing H4 trend.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::Granularity;
use crate::domain::signal::{Direction, EntrySignal, GateDiagnostics, StrategyResult};
use crate::domain::zone::ZoneRole;
use crate::indicators::atr;
use crate::risk::stops;
use crate::session;
use crate::strategies::trend::{h4_trend_bias, TrendBias};
use crate::strategies::{StrategyContext, TradingStrategy};
use crate::zones::detect_zones;

const GATES: &[&str] = &[
    "data_sufficiency",
    "session",
    "zone_availability",
    "trend_filter",
    "proximity",
    "rejection_wick",
    "stop_target",
];

const MIN_DAILY_CANDLES: usize = 30;
const MIN_H4_CANDLES: usize = 51;
const DAILY_ATR_PERIOD: usize = 14;

pub struct SrRejectionConfig {
    pub zone_tolerance: Decimal,
    pub zone_min_strength: u32,
    pub default_target_rr: Decimal,
}

impl Default for SrRejectionConfig {
    fn default() -> Self {
        Self {
            zone_tolerance: dec!(0.0020),
            zone_min_strength: 2,
            default_target_rr: dec!(2),
        }
    }
}

#[derive(Default)]
pub struct SrRejectionStrategy {
    config: SrRejectionConfig,
}

impl SrRejectionStrategy {
    pub fn new(config: SrRejectionConfig) -> Self {
        Self { config }
    }

}

impl TradingStrategy for SrRejectionStrategy {
    fn id(&self) -> &'static str {
        "sr_rejection"
    }

    fn gates(&self) -> &'static [&'static str] {
        GATES
    }

    fn evaluate(&self, ctx: &StrategyContext) -> StrategyResult {
        let mut diagnostics = GateDiagnostics::default();

        if !ctx.has_minimum(Granularity::D1, MIN_DAILY_CANDLES)
            || !ctx.has_minimum(Granularity::H4, MIN_H4_CANDLES)
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

        let daily = ctx.series(Granularity::D1).unwrap();
        let h4 = ctx.series(Granularity::H4).unwrap();

        let zones = detect_zones(
            daily,
            self.config.zone_tolerance,
            self.config.zone_min_strength,
            ctx.evaluated_at,
        );
        if zones.is_empty() {
            diagnostics.fail("zone_availability");
            return StrategyResult::veto("no zones detected on daily series", diagnostics);
        }
        diagnostics.record_pass("zone_availability");
        diagnostics.field("zone_count", zones.len());

        let trend = match h4_trend_bias(h4) {
            Some(t) => t,
            None => {
                diagnostics.fail("trend_filter");
                return StrategyResult::veto("trend indicators unavailable", diagnostics);
            }
        };

        let latest_h4 = h4.last().unwrap();
        let touched_zone = zones.iter().find(|z| latest_h4.touches(z.level));
        let zone = match touched_zone {
            Some(z) => z,
            None => {
                diagnostics.fail("proximity");
                return StrategyResult::veto("no zone touched by latest H4 candle", diagnostics);
            }
        };
        diagnostics.record_pass("proximity");

        let (acting_role, flipped) = zone.acting_role(latest_h4.close);
        let direction = match acting_role {
            ZoneRole::Support => Direction::Buy,
            ZoneRole::Resistance => Direction::Sell,
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

        let opposite_shadow = match direction {
            Direction::Buy => latest_h4.lower_shadow(),
            Direction::Sell => latest_h4.upper_shadow(),
        };
        if opposite_shadow < latest_h4.body() {
            diagnostics.fail("rejection_wick");
            return StrategyResult::veto("rejection wick too small", diagnostics);
        }
        diagnostics.record_pass("rejection_wick");

        let daily_atr = match atr(daily, DAILY_ATR_PERIOD) {
            Some(value) => value,
            None => {
                diagnostics.fail("stop_target");
                return StrategyResult::veto("ATR unavailable", diagnostics);
            }
        };
        let target_rr = ctx.config.target_rr.unwrap_or(self.config.default_target_rr);

        let entry = latest_h4.close;
        let (stop, target) = match stops::sr_rejection(
            entry,
            direction,
            daily_atr,
            target_rr,
            &zones,
            Some(zone.level),
        ) {
            Ok(pair) => pair,
            Err(veto) => {
                diagnostics.fail("stop_target");
                return StrategyResult::veto(veto.to_string(), diagnostics);
            }
        };
        diagnostics.record_pass("stop_target");

        let reason = format!(
            "{direction} rejection at {role} (zone {level}{flip})",
            direction = direction,
            role = if acting_role == ZoneRole::Support {
                "support"
            } else {
                "resistance"
            },
            level = zone.level,
            flip = if flipped { ", flipped" } else { "" },
        );

        StrategyResult::Signal(EntrySignal {
            direction,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            zone: Some(zone.clone()),
            reason,
            stream: ctx.config.name.clone(),
            evaluated_at: ctx.evaluated_at,
        })
    }
}
