//! Scalp trailing-stop rule: move to breakeven at 1R, then trail 0.5R behind
//! price once unrealised gain reaches 1.5R. The stop is monotonic — it never
//! moves against the trade, even if a later reading would suggest otherwise.

use rust_decimal::Decimal;

use crate::domain::signal::Direction;

/// Returns the stop that should now be in force. `initial_stop_distance` is
/// the distance from entry to the *original* stop, fixed at trade open.
pub fn advance(
    direction: Direction,
    entry: Decimal,
    initial_stop_distance: Decimal,
    current_stop: Decimal,
    current_price: Decimal,
) -> Decimal {
    if initial_stop_distance.is_zero() {
        return current_stop;
    }

    let favorable_move = match direction {
        Direction::Buy => current_price - entry,
        Direction::Sell => entry - current_price,
    };
    let r = favorable_move / initial_stop_distance;

    let candidate = if r >= Decimal::new(15, 1) {
        match direction {
            Direction::Buy => current_price - Decimal::new(5, 1) * initial_stop_distance,
            Direction::Sell => current_price + Decimal::new(5, 1) * initial_stop_distance,
        }
    } else if r >= Decimal::ONE {
        entry
    } else {
        return current_stop;
    };

    match direction {
        Direction::Buy => candidate.max(current_stop),
        Direction::Sell => candidate.min(current_stop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn moves_to_breakeven_at_one_r() {
        let stop = advance(
            Direction::Buy,
            dec!(1.10000),
            dec!(0.00200),
            dec!(1.09800),
            dec!(1.10200),
        );
        assert_eq!(stop, dec!(1.10000));
    }

    #[test]
    fn trails_half_r_behind_price_past_one_point_five_r() {
        let stop = advance(
            Direction::Buy,
            dec!(1.10000),
            dec!(0.00200),
            dec!(1.10000),
            dec!(1.10300),
        );
        assert_eq!(stop, dec!(1.10200));
    }

    #[test]
    fn stop_never_moves_backward() {
        let stop = advance(
            Direction::Buy,
            dec!(1.10000),
            dec!(0.00200),
            dec!(1.10150),
            dec!(1.10120),
        );
        assert_eq!(stop, dec!(1.10150));
    }

    #[test]
    fn sell_side_trails_above_price() {
        let stop = advance(
            Direction::Sell,
            dec!(1.10000),
            dec!(0.00200),
            dec!(1.10000),
            dec!(1.09700),
        );
        assert_eq!(stop, dec!(1.09800));
    }
}
