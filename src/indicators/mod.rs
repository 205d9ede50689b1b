//! Pure numeric primitives over an ordered candle sequence. No hidden state:
//! every function takes the candles it needs and returns the latest value
//! only; callers that need a series call in a loop. Insufficient data is
//! signalled by `None`, which callers treat as a strategy veto.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::candle::Candle;

fn closes_f64(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| c.close.to_f64().unwrap_or(0.0))
        .collect()
}

fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64_retain(v).unwrap_or(Decimal::ZERO)
}

/// EMA(n): needs at least `n+1` candles (seeded with the SMA of the first
/// `n` closes, then exponential recursion over the rest).
pub fn ema(candles: &[Candle], n: usize) -> Option<Decimal> {
    if n == 0 || candles.len() < n + 1 {
        return None;
    }
    let closes = closes_f64(candles);
    let alpha = 2.0 / (n as f64 + 1.0);
    let mut value = closes[..n].iter().sum::<f64>() / n as f64;
    for &price in &closes[n..] {
        value = alpha * price + (1.0 - alpha) * value;
    }
    Some(to_decimal(value))
}

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    for (i, c) in candles.iter().enumerate() {
        let high = c.high.to_f64().unwrap_or(0.0);
        let low = c.low.to_f64().unwrap_or(0.0);
        let tr = if i == 0 {
            high - low
        } else {
            let prev_close = candles[i - 1].close.to_f64().unwrap_or(0.0);
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        };
        out.push(tr);
    }
    out
}

/// ATR(n) via Wilder smoothing. Minimum priming window is `n+1` candles: `n`
/// true ranges seed the average, the `(n+1)`th applies one smoothing step.
pub fn atr(candles: &[Candle], n: usize) -> Option<Decimal> {
    if n == 0 || candles.len() < n + 1 {
        return None;
    }
    let tr = true_ranges(candles);
    let mut value = tr[..n].iter().sum::<f64>() / n as f64;
    for &t in &tr[n..] {
        value = (value * (n as f64 - 1.0) + t) / n as f64;
    }
    Some(to_decimal(value))
}

/// RSI(n) via average-gain/average-loss Wilder smoothing. Minimum priming
/// window is `n+1` closes (`n` price changes).
pub fn rsi(candles: &[Candle], n: usize) -> Option<Decimal> {
    if n == 0 || candles.len() < n + 1 {
        return None;
    }
    let closes = closes_f64(candles);
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..n].iter().map(|d| d.max(0.0)).sum::<f64>() / n as f64;
    let mut avg_loss = changes[..n].iter().map(|d| (-d).max(0.0)).sum::<f64>() / n as f64;

    for &d in &changes[n..] {
        let gain = d.max(0.0);
        let loss = (-d).max(0.0);
        avg_gain = (avg_gain * (n as f64 - 1.0) + gain) / n as f64;
        avg_loss = (avg_loss * (n as f64 - 1.0) + loss) / n as f64;
    }

    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    };
    Some(to_decimal(rsi))
}

/// ADX(n) over the (+DI, -DI, DX) chain, Wilder-smoothed throughout.
/// Requires `2n+1` candles: `n` to seed the directional-movement/TR
/// smoothing, `n` more to accumulate DX values, plus one leading candle to
/// compute the first directional move.
pub fn adx(candles: &[Candle], n: usize) -> Option<Decimal> {
    if n == 0 || candles.len() < 2 * n + 1 {
        return None;
    }
    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    let mut tr = Vec::with_capacity(candles.len() - 1);

    for i in 1..candles.len() {
        let up_move = (candles[i].high - candles[i - 1].high)
            .to_f64()
            .unwrap_or(0.0);
        let down_move = (candles[i - 1].low - candles[i].low)
            .to_f64()
            .unwrap_or(0.0);
        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });

        let high = candles[i].high.to_f64().unwrap_or(0.0);
        let low = candles[i].low.to_f64().unwrap_or(0.0);
        let prev_close = candles[i - 1].close.to_f64().unwrap_or(0.0);
        tr.push(
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs()),
        );
    }

    let mut smoothed_tr = tr[..n].iter().sum::<f64>();
    let mut smoothed_plus = plus_dm[..n].iter().sum::<f64>();
    let mut smoothed_minus = minus_dm[..n].iter().sum::<f64>();

    let dx_at = |smoothed_tr: f64, smoothed_plus: f64, smoothed_minus: f64| -> f64 {
        if smoothed_tr == 0.0 {
            return 0.0;
        }
        let plus_di = 100.0 * smoothed_plus / smoothed_tr;
        let minus_di = 100.0 * smoothed_minus / smoothed_tr;
        let sum = plus_di + minus_di;
        if sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / sum
        }
    };

    let mut dx_values = vec![dx_at(smoothed_tr, smoothed_plus, smoothed_minus)];

    for i in n..(2 * n) {
        smoothed_tr = smoothed_tr - smoothed_tr / n as f64 + tr[i];
        smoothed_plus = smoothed_plus - smoothed_plus / n as f64 + plus_dm[i];
        smoothed_minus = smoothed_minus - smoothed_minus / n as f64 + minus_dm[i];
        dx_values.push(dx_at(smoothed_tr, smoothed_plus, smoothed_minus));
    }

    let adx = dx_values.iter().sum::<f64>() / dx_values.len() as f64;
    Some(to_decimal(adx))
}

/// Bollinger(n, sigma) -> (lower, middle, upper) from a simple moving
/// average and population standard deviation of the last `n` closes.
pub fn bollinger(candles: &[Candle], n: usize, sigma: f64) -> Option<(Decimal, Decimal, Decimal)> {
    if n == 0 || candles.len() < n {
        return None;
    }
    let closes = closes_f64(candles);
    let window = &closes[closes.len() - n..];
    let mean = window.iter().sum::<f64>() / n as f64;
    let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();

    Some((
        to_decimal(mean - sigma * std_dev),
        to_decimal(mean),
        to_decimal(mean + sigma * std_dev),
    ))
}

/// A candle at `index` is a swing high if its high exceeds every high in
/// `[index-k, index)` and `(index, index+k]`; symmetric for swing lows.
pub fn swing_highs(candles: &[Candle], k: usize) -> Vec<usize> {
    swing_indices(candles, k, true)
}

pub fn swing_lows(candles: &[Candle], k: usize) -> Vec<usize> {
    swing_indices(candles, k, false)
}

fn swing_indices(candles: &[Candle], k: usize, high: bool) -> Vec<usize> {
    if k == 0 || candles.len() < 2 * k + 1 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in k..candles.len() - k {
        let pivot = if high {
            candles[i].high
        } else {
            candles[i].low
        };
        let is_swing = (i - k..i).chain(i + 1..=i + k).all(|j| {
            let other = if high { candles[j].high } else { candles[j].low };
            if high { pivot > other } else { pivot < other }
        });
        if is_swing {
            out.push(i);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Granularity;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(open: f64, high: f64, low: f64, close: f64, idx: i64) -> Candle {
        Candle {
            instrument: "EUR_USD".to_string(),
            granularity: Granularity::H4,
            timestamp: Utc.timestamp_opt(idx * 3600, 0).unwrap(),
            open: Decimal::from_f64_retain(open).unwrap(),
            high: Decimal::from_f64_retain(high).unwrap(),
            low: Decimal::from_f64_retain(low).unwrap(),
            close: Decimal::from_f64_retain(close).unwrap(),
            volume: dec!(1000),
        }
    }

    #[test]
    fn ema_insufficient_data_is_none() {
        let candles = vec![candle(1.0, 1.1, 0.9, 1.0, 0)];
        assert_eq!(ema(&candles, 5), None);
    }

    #[test]
    fn ema_seeds_with_sma_then_recurses() {
        let candles: Vec<Candle> = (0..7)
            .map(|i| candle(1.0, 1.0, 1.0, 1.0 + i as f64 * 0.01, i))
            .collect();
        let value = ema(&candles, 5).expect("enough candles");
        assert!(value > dec!(1.0));
    }

    #[test]
    fn ema_requires_n_plus_one_candles() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| candle(1.0, 1.0, 1.0, 1.0 + i as f64 * 0.01, i))
            .collect();
        assert_eq!(ema(&candles, 5), None);
    }

    #[test]
    fn atr_requires_n_plus_one_candles() {
        let candles: Vec<Candle> = (0..14)
            .map(|i| candle(1.1, 1.12, 1.08, 1.10, i))
            .collect();
        assert_eq!(atr(&candles, 14), None);
        let candles: Vec<Candle> = (0..15)
            .map(|i| candle(1.1, 1.12, 1.08, 1.10, i))
            .collect();
        assert!(atr(&candles, 14).is_some());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let candles: Vec<Candle> = (0..15)
            .map(|i| candle(1.0, 1.0, 1.0, 1.0 + i as f64 * 0.01, i))
            .collect();
        let value = rsi(&candles, 14).expect("enough candles");
        assert_eq!(value, dec!(100));
    }

    #[test]
    fn bollinger_bands_are_symmetric_around_mean() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| candle(1.0, 1.0, 1.0, 1.0 + (i % 2) as f64 * 0.01, i))
            .collect();
        let (lower, middle, upper) = bollinger(&candles, 20, 2.0).expect("enough candles");
        assert!(lower < middle);
        assert!(middle < upper);
        assert_eq!(middle - lower, upper - middle);
    }

    #[test]
    fn swing_high_detected_at_local_peak() {
        let mut candles: Vec<Candle> = (0..7).map(|i| candle(1.0, 1.0, 0.9, 1.0, i)).collect();
        candles[3].high = dec!(1.5);
        let swings = swing_highs(&candles, 3);
        assert_eq!(swings, vec![3]);
    }
}
