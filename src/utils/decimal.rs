//! Decimal arithmetic utilities for order volumes.

use rust_decimal::Decimal;

/// Round to the nearest multiple of `step`.
///
/// Uses `Decimal::round`, which breaks ties toward the even multiple.
/// `None` when `step` is not positive or the quotient overflows.
pub fn round_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    snap_to_step(value, step, Decimal::round)
}

/// Round up to the next multiple of `step`.
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    snap_to_step(value, step, Decimal::ceil)
}

/// Round down to the previous multiple of `step`.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    snap_to_step(value, step, Decimal::floor)
}

fn snap_to_step(value: Decimal, step: Decimal, snap: fn(&Decimal) -> Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return None;
    }
    let steps = value.checked_div(step)?;
    snap(&steps).checked_mul(step)
}

/// True when `value` is an exact integer multiple of `step`.
pub fn is_step_multiple(value: Decimal, step: Decimal) -> bool {
    if step <= Decimal::ZERO {
        return false;
    }
    value.checked_rem(step).is_some_and(|r| r.is_zero())
}

/// Convert an `f64` into a `Decimal`, rejecting NaN and infinities.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::try_from(value).ok()
}
