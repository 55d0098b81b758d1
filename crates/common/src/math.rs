//! Checked integer helpers - no unwrap, no panics, rounding is always explicit

/// Rounding mode applied when an exact quotient does not fit the target precision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Toward negative infinity
    Floor,
    /// Toward positive infinity (up in magnitude for positive values,
    /// toward zero for negative ones)
    Ceil,
    /// Truncate
    TowardZero,
}

/// 10^exp as i128; exp must stay below 39
pub const fn pow10(exp: u32) -> i128 {
    let mut acc: i128 = 1;
    let mut i = 0;
    while i < exp {
        acc *= 10;
        i += 1;
    }
    acc
}

/// Divide with the requested rounding (returns None on division by zero or overflow)
pub fn div_round(n: i128, d: i128, rounding: Rounding) -> Option<i128> {
    if d == 0 {
        return None;
    }
    let q = n.checked_div(d)?;
    let r = n.checked_rem(d)?;
    if r == 0 {
        return Some(q);
    }
    let positive_quotient = (r > 0) == (d > 0);
    match rounding {
        Rounding::TowardZero => Some(q),
        Rounding::Floor => {
            if positive_quotient {
                Some(q)
            } else {
                q.checked_sub(1)
            }
        }
        Rounding::Ceil => {
            if positive_quotient {
                q.checked_add(1)
            } else {
                Some(q)
            }
        }
    }
}

/// a * b / d with explicit rounding
pub fn mul_div(a: i128, b: i128, d: i128, rounding: Rounding) -> Option<i128> {
    let product = a.checked_mul(b)?;
    div_round(product, d, rounding)
}
