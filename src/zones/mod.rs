//! Zone Detector: clusters swing extremes from a daily/hourly candle series
//! into support/resistance levels. Zones are regenerated fresh every
//! evaluation cycle — they are never a long-lived mutable graph.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::candle::Candle;
use crate::domain::zone::{Zone, ZoneRole};
use crate::indicators::{swing_highs, swing_lows};

const DEFAULT_SWING_WINDOW: usize = 3;

struct Point {
    price: Decimal,
    role: ZoneRole,
}

/// Collect swing highs/lows, cluster points within `tolerance` of each
/// other, and keep clusters whose member count meets `min_strength`. A
/// cluster's level is the mean of its members; its role is the majority
/// role among members, ties broken to resistance.
pub fn detect_zones(
    candles: &[Candle],
    tolerance: Decimal,
    min_strength: u32,
    detected_at: DateTime<Utc>,
) -> Vec<Zone> {
    let mut points: Vec<Point> = swing_highs(candles, DEFAULT_SWING_WINDOW)
        .into_iter()
        .map(|i| Point {
            price: candles[i].high,
            role: ZoneRole::Resistance,
        })
        .chain(
            swing_lows(candles, DEFAULT_SWING_WINDOW)
                .into_iter()
                .map(|i| Point {
                    price: candles[i].low,
                    role: ZoneRole::Support,
                }),
        )
        .collect();

    points.sort_by(|a, b| a.price.cmp(&b.price));

    let mut clusters: Vec<Vec<Point>> = Vec::new();
    for point in points.drain(..) {
        match clusters.last_mut() {
            Some(cluster) if point.price - cluster.last().unwrap().price <= tolerance => {
                cluster.push(point);
            }
            _ => clusters.push(vec![point]),
        }
    }

    clusters
        .into_iter()
        .filter(|cluster| cluster.len() as u32 >= min_strength)
        .map(|cluster| {
            let strength = cluster.len() as u32;
            let sum: Decimal = cluster.iter().map(|p| p.price).sum();
            let level = sum / Decimal::from(cluster.len());
            let resistance_votes = cluster
                .iter()
                .filter(|p| p.role == ZoneRole::Resistance)
                .count();
            let support_votes = cluster.len() - resistance_votes;
            let role = if resistance_votes >= support_votes {
                ZoneRole::Resistance
            } else {
                ZoneRole::Support
            };
            Zone {
                level,
                role,
                strength,
                detected_at,
                invalidated_at: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Granularity;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(high: f64, low: f64, idx: i64) -> Candle {
        Candle {
            instrument: "EUR_USD".to_string(),
            granularity: Granularity::D1,
            timestamp: Utc.timestamp_opt(idx * 86400, 0).unwrap(),
            open: Decimal::from_f64_retain((high + low) / 2.0).unwrap(),
            high: Decimal::from_f64_retain(high).unwrap(),
            low: Decimal::from_f64_retain(low).unwrap(),
            close: Decimal::from_f64_retain((high + low) / 2.0).unwrap(),
            volume: dec!(1000),
        }
    }

    #[test]
    fn flat_series_has_no_swings_and_no_zones() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(1.1, 1.09, i)).collect();
        let zones = detect_zones(&candles, dec!(0.0020), 1, Utc::now());
        assert!(zones.is_empty());
    }

    #[test]
    fn weak_cluster_is_dropped_below_min_strength() {
        let mut candles: Vec<Candle> = (0..9).map(|i| candle(1.10, 1.09, i)).collect();
        candles[4].high = dec!(1.20);
        let zones = detect_zones(&candles, dec!(0.0020), 2, Utc::now());
        assert!(zones.is_empty());
    }

    #[test]
    fn acting_role_flips_when_close_crosses_level() {
        let zone = Zone {
            level: dec!(1.1000),
            role: ZoneRole::Resistance,
            strength: 3,
            detected_at: Utc::now(),
            invalidated_at: None,
        };
        let (role, flipped) = zone.acting_role(dec!(1.1050));
        assert_eq!(role, ZoneRole::Support);
        assert!(flipped);

        let (role, flipped) = zone.acting_role(dec!(1.0950));
        assert_eq!(role, ZoneRole::Resistance);
        assert!(!flipped);
    }
}
