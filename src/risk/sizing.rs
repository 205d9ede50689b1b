//! Risk Sizer: computes position units from equity, risk percent, and stop distance.

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizingVeto {
    StopTooTight,
    SizeBelowMinimum,
}

impl std::fmt::Display for SizingVeto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingVeto::StopTooTight => write!(f, "stop too tight"),
            SizingVeto::SizeBelowMinimum => write!(f, "size below minimum"),
        }
    }
}

/// `risk_cash = E * r / 100`; `stop_pips = |P - S| / pip`;
/// `units = risk_cash / (stop_pips * pip_value)`, rounded toward zero to
/// `unit_step` granularity (1 for most instruments, a broker-supplied
/// fractional step for metals).
pub fn size_position(
    equity: Decimal,
    risk_percent: Decimal,
    entry: Decimal,
    stop: Decimal,
    pip: Decimal,
    pip_value: Decimal,
    unit_step: Decimal,
) -> Result<Decimal, SizingVeto> {
    let risk_cash = equity * risk_percent / Decimal::from(100);
    let stop_pips = (entry - stop).abs() / pip;

    if stop_pips.is_zero() {
        return Err(SizingVeto::StopTooTight);
    }

    let raw_units = risk_cash / (stop_pips * pip_value);
    let units = (raw_units / unit_step).trunc() * unit_step;

    if units < Decimal::ONE.min(unit_step) || units.is_zero() {
        return Err(SizingVeto::SizeBelowMinimum);
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// S5. Equity 10000, risk 1%, entry 1.20000, SL 1.19800 on EUR_USD:
    /// stop_pips = 20, risk_cash = 100, units = 100/(20*0.0001) = 50000.
    #[test]
    fn s5_sizing_scenario() {
        let units = size_position(
            dec!(10000),
            dec!(1),
            dec!(1.20000),
            dec!(1.19800),
            dec!(0.0001),
            dec!(0.0001),
            dec!(1),
        )
        .unwrap();
        assert_eq!(units, dec!(50000));
    }

    #[test]
    fn zero_stop_distance_is_vetoed() {
        let result = size_position(
            dec!(10000),
            dec!(1),
            dec!(1.20000),
            dec!(1.20000),
            dec!(0.0001),
            dec!(0.0001),
            dec!(1),
        );
        assert_eq!(result, Err(SizingVeto::StopTooTight));
    }

    #[test]
    fn tiny_risk_budget_is_vetoed_below_minimum() {
        let result = size_position(
            dec!(10),
            dec!(1),
            dec!(1.20000),
            dec!(1.00000),
            dec!(0.0001),
            dec!(0.0001),
            dec!(1),
        );
        assert_eq!(result, Err(SizingVeto::SizeBelowMinimum));
    }

    /// Property 3: worst-case cash loss never exceeds the risk budget by
    /// more than one unit-granularity step.
    #[test]
    fn worst_case_loss_respects_risk_budget_within_one_step() {
        let equity = dec!(25000);
        let risk_percent = dec!(2);
        let entry = dec!(1.31000);
        let stop = dec!(1.30750);
        let pip = dec!(0.0001);
        let pip_value = dec!(0.0001);
        let unit_step = dec!(1);

        let units = size_position(equity, risk_percent, entry, stop, pip, pip_value, unit_step)
            .unwrap();

        let worst_case_loss = units * (entry - stop).abs() / pip * pip_value;
        let risk_budget = equity * risk_percent / Decimal::from(100);
        let one_step_cash = unit_step * (entry - stop).abs() / pip * pip_value;

        assert!(worst_case_loss <= risk_budget + one_step_cash);
    }
}
