//! Stop/target derivation per strategy family (§4.5).

use rust_decimal::Decimal;

use crate::domain::signal::Direction;
use crate::domain::zone::Zone;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopTargetVeto {
    TargetTooClose,
    StopClampExceedsTarget,
}

impl std::fmt::Display for StopTargetVeto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopTargetVeto::TargetTooClose => write!(f, "target distance below one ATR"),
            StopTargetVeto::StopClampExceedsTarget => {
                write!(f, "clamped stop distance exceeds target distance")
            }
        }
    }
}

fn clamp(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

/// Nearest zone level strictly in the profit direction from `entry`,
/// excluding the triggering zone.
pub fn nearest_zone_in_profit_direction(
    zones: &[Zone],
    entry: Decimal,
    direction: Direction,
    triggering_zone_level: Option<Decimal>,
) -> Option<Decimal> {
    zones
        .iter()
        .map(|z| z.level)
        .filter(|&level| Some(level) != triggering_zone_level)
        .filter(|&level| match direction {
            Direction::Buy => level > entry,
            Direction::Sell => level < entry,
        })
        .min_by_key(|&level| (level - entry).abs())
}

/// Zone-anchored stop/target for the S/R rejection strategy.
pub fn sr_rejection(
    entry: Decimal,
    direction: Direction,
    daily_atr: Decimal,
    target_rr: Decimal,
    zones: &[Zone],
    triggering_zone_level: Option<Decimal>,
) -> Result<(Decimal, Decimal), StopTargetVeto> {
    let target = nearest_zone_in_profit_direction(zones, entry, direction, triggering_zone_level)
        .unwrap_or_else(|| match direction {
            Direction::Buy => entry + Decimal::from(2) * daily_atr * target_rr,
            Direction::Sell => entry - Decimal::from(2) * daily_atr * target_rr,
        });

    let target_distance = (target - entry).abs();
    if target_distance < daily_atr {
        return Err(StopTargetVeto::TargetTooClose);
    }

    let raw_stop_distance = target_distance / target_rr;
    let stop_distance = clamp(
        raw_stop_distance,
        Decimal::new(5, 1) * daily_atr,
        Decimal::from(2) * daily_atr,
    );
    if stop_distance > target_distance {
        return Err(StopTargetVeto::StopClampExceedsTarget);
    }

    let stop = match direction {
        Direction::Buy => entry - stop_distance,
        Direction::Sell => entry + stop_distance,
    };
    Ok((stop, target))
}

/// Scalp stop/target: stop anchored to the recent M5 swing extreme plus a
/// pip offset, stop distance clamped to `[200, 800]` pips, target fixed at
/// 1.5x the clamped stop distance.
pub fn momentum_scalp(
    entry: Decimal,
    direction: Direction,
    swing_extreme: Decimal,
    offset_pips: Decimal,
    pip: Decimal,
) -> (Decimal, Decimal) {
    let raw_stop = match direction {
        Direction::Buy => swing_extreme - offset_pips * pip,
        Direction::Sell => swing_extreme + offset_pips * pip,
    };
    let raw_distance = (entry - raw_stop).abs();
    let clamped_distance = clamp(raw_distance, Decimal::from(200) * pip, Decimal::from(800) * pip);

    let stop = match direction {
        Direction::Buy => entry - clamped_distance,
        Direction::Sell => entry + clamped_distance,
    };
    let target = match direction {
        Direction::Buy => entry + Decimal::new(15, 1) * clamped_distance,
        Direction::Sell => entry - Decimal::new(15, 1) * clamped_distance,
    };
    (stop, target)
}

/// Mean-reversion stop/target: stop beyond the range boundary (zone +/-
/// ATR buffer), clamped to `[10, 50]` pips from entry; target is the
/// Bollinger middle line.
pub fn mean_reversion(
    entry: Decimal,
    direction: Direction,
    zone_level: Decimal,
    atr_buffer: Decimal,
    bollinger_middle: Decimal,
    pip: Decimal,
) -> (Decimal, Decimal) {
    let raw_stop = match direction {
        Direction::Buy => zone_level - atr_buffer,
        Direction::Sell => zone_level + atr_buffer,
    };
    let raw_distance = (entry - raw_stop).abs();
    let clamped_distance = clamp(raw_distance, Decimal::from(10) * pip, Decimal::from(50) * pip);

    let stop = match direction {
        Direction::Buy => entry - clamped_distance,
        Direction::Sell => entry + clamped_distance,
    };
    (stop, bollinger_middle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::zone::ZoneRole;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn zone(level: Decimal) -> Zone {
        Zone {
            level,
            role: ZoneRole::Resistance,
            strength: 2,
            detected_at: Utc::now(),
            invalidated_at: None,
        }
    }

    /// S1. Bullish rejection at support: entry 1.10090, nearest zone above
    /// 1.10500, ATR 0.00200, target R:R 2 -> SL 1.09885, TP 1.10500.
    #[test]
    fn s1_sr_rejection_scenario() {
        let zones = vec![zone(dec!(1.10500))];
        let (stop, target) = sr_rejection(
            dec!(1.10090),
            Direction::Buy,
            dec!(0.00200),
            dec!(2),
            &zones,
            Some(dec!(1.10000)),
        )
        .unwrap();
        assert_eq!(target, dec!(1.10500));
        assert_eq!(stop, dec!(1.09885));
    }

    #[test]
    fn sr_rejection_vetoes_when_target_is_closer_than_one_atr() {
        let zones = vec![zone(dec!(1.10100))];
        let result = sr_rejection(
            dec!(1.10090),
            Direction::Buy,
            dec!(0.00200),
            dec!(2),
            &zones,
            None,
        );
        assert_eq!(result, Err(StopTargetVeto::TargetTooClose));
    }

    #[test]
    fn momentum_scalp_clamps_stop_distance_to_pip_bounds() {
        let (stop, target) = momentum_scalp(
            dec!(1.10000),
            Direction::Buy,
            dec!(1.09995),
            dec!(30),
            dec!(0.0001),
        );
        // raw distance = (1.10000 - (1.09995 - 0.0030)) = 0.00325 -> clamped up to 0.02 (200 pips)
        assert_eq!(stop, dec!(1.08000));
        assert_eq!(target, dec!(1.13000));
    }

    #[test]
    fn mean_reversion_target_is_bollinger_middle() {
        let (stop, target) = mean_reversion(
            dec!(1.10000),
            Direction::Sell,
            dec!(1.10200),
            dec!(0.00100),
            dec!(1.10100),
            dec!(0.0001),
        );
        assert_eq!(target, dec!(1.10100));
        assert!(stop > dec!(1.10000));
    }
}
