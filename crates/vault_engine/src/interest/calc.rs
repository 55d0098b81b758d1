//! Pure interest arithmetic - no state, no panics, rounding always explicit

use vault_common::math::{mul_div, pow10, Rounding};
use vault_common::{Amount, Height, HighPrecision, LoanError, LoanResult};

use crate::state::InterestRecord;

/// 24 - 8 (amount) - 8 (rate) - 2 (percent)
const IPB_SHIFT: u32 = 6;

/// Interest per block for `amount` at annual `rate_pct`
///
/// `ipb = amount * rate / 100 / blocks_per_year`, computed on the magnitude
/// and truncated toward zero before the sign is applied.
pub fn interest_per_block(amount: Amount, rate_pct: Amount, blocks_per_year: u64) -> LoanResult<HighPrecision> {
    if blocks_per_year == 0 {
        return Err(LoanError::Overflow);
    }
    if amount.is_zero() || rate_pct.is_zero() {
        return Ok(HighPrecision::ZERO);
    }
    let negative = amount.is_negative() != rate_pct.is_negative();
    let scaled = amount
        .raw()
        .checked_abs()
        .and_then(|a| a.checked_mul(pow10(IPB_SHIFT)))
        .ok_or(LoanError::Overflow)?;
    let magnitude = mul_div(
        scaled,
        rate_pct.raw().checked_abs().ok_or(LoanError::Overflow)?,
        blocks_per_year as i128,
        Rounding::TowardZero,
    )
    .ok_or(LoanError::Overflow)?;
    Ok(HighPrecision::from_raw(if negative { -magnitude } else { magnitude }))
}

/// `ith + ipb * (height - record.height)`; heights below the checkpoint accrue nothing
pub fn accrued_to(record: &InterestRecord, height: Height) -> LoanResult<HighPrecision> {
    let elapsed = height.saturating_sub(record.height);
    if elapsed == 0 {
        return Ok(record.ith);
    }
    let delta = record.ipb.checked_mul_int(elapsed as i128)?;
    Ok(record.ith.checked_add(delta)?)
}

/// Reported interest: up when positive, toward zero when negative
pub fn reported(ith: HighPrecision) -> LoanResult<Amount> {
    Ok(ith.rescale::<8>(Rounding::Ceil)?)
}

/// Satoshi part of a (usually negative) reservoir, truncated toward zero
pub fn truncated(ith: HighPrecision) -> LoanResult<Amount> {
    Ok(ith.rescale::<8>(Rounding::TowardZero)?)
}

/// Interest part of a payback: everything `y` can cover of `ith`
/// Returns `(interest_paid, ith_after)`.
pub fn consume_reservoir(ith: HighPrecision, payment: Amount) -> LoanResult<(Amount, HighPrecision)> {
    if !ith.is_positive() {
        return Ok((Amount::ZERO, ith));
    }
    let owed = reported(ith)?;
    if payment >= owed {
        return Ok((owed, HighPrecision::ZERO));
    }
    let after = ith.checked_sub(payment.to_high_precision()?)?;
    Ok((payment, after))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BPY: u64 = 1_051_200;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipb_one_percent() {
        let ipb = interest_per_block(Amount::ONE, amt("1"), BPY).unwrap();
        assert_eq!(ipb.raw(), 9_512_937_595_129_375);
    }

    #[test]
    fn test_ipb_negative_rate() {
        let ipb = interest_per_block(Amount::ONE, amt("-2"), BPY).unwrap();
        assert_eq!(ipb.raw(), -19_025_875_190_258_751);
    }

    #[test]
    fn test_ipb_zero_inputs() {
        assert!(interest_per_block(Amount::ZERO, amt("5"), BPY).unwrap().is_zero());
        assert!(interest_per_block(Amount::ONE, Amount::ZERO, BPY).unwrap().is_zero());
        assert!(interest_per_block(Amount::ONE, amt("1"), 0).is_err());
    }

    #[test]
    fn test_accrual_hundred_blocks() {
        let record = InterestRecord {
            ipb: HighPrecision::from_raw(9_512_937_595_129_375),
            ith: HighPrecision::ZERO,
            height: 10,
        };
        let ith = accrued_to(&record, 110).unwrap();
        assert_eq!(ith.to_string(), "0.000000951293759512937500");
        assert_eq!(accrued_to(&record, 10).unwrap(), HighPrecision::ZERO);
        assert_eq!(accrued_to(&record, 5).unwrap(), HighPrecision::ZERO);
    }

    #[test]
    fn test_reported_rounding() {
        let positive = HighPrecision::from_raw(951_293_759_512_937_500);
        assert_eq!(reported(positive).unwrap().raw(), 96);
        let negative = HighPrecision::from_raw(-951_293_759_512_937_500);
        assert_eq!(reported(negative).unwrap().raw(), -95);
        assert_eq!(truncated(negative).unwrap().raw(), -95);
    }

    #[test]
    fn test_consume_reservoir() {
        // 380.5 satoshi of interest
        let ith = HighPrecision::from_raw(3_805_000_000_000_000_000);
        let (paid, after) = consume_reservoir(ith, Amount::from_raw(1)).unwrap();
        assert_eq!(paid.raw(), 1);
        assert_eq!(after.raw(), 3_795_000_000_000_000_000);

        let (paid, after) = consume_reservoir(ith, Amount::from_raw(1_000)).unwrap();
        assert_eq!(paid.raw(), 381);
        assert!(after.is_zero());

        let rebate = ith.checked_neg().unwrap();
        let (paid, after) = consume_reservoir(rebate, Amount::from_raw(5)).unwrap();
        assert!(paid.is_zero());
        assert_eq!(after, rebate);
    }
}
