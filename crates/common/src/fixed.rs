//! Signed decimal fixed point parameterized by the number of fractional digits
//!
//! Token amounts and prices carry 8 fractional digits (`Amount`), interest
//! checkpoints carry 24 (`HighPrecision`). Conversions between precisions are
//! explicit and every lossy step names its rounding mode.

use core::fmt;
use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::math::{div_round, mul_div, pow10, Rounding};

/// Fixed point errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixedError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Invalid decimal: {0}")]
    Parse(String),

    #[error("Invalid amount {0}: more than {1} decimal places")]
    Precision(String, u32),
}

/// Signed decimal with `DIGITS` fractional digits stored as a scaled i128
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed<const DIGITS: u32>(i128);

/// 8 fractional digits: balances, loan amounts, prices, rates
pub type Amount = Fixed<8>;

/// 24 fractional digits: interest per block and interest to height
pub type HighPrecision = Fixed<24>;

/// Satoshis per coin
pub const COIN: i128 = 100_000_000;

impl<const D: u32> Fixed<D> {
    /// Raw units per whole number
    pub const SCALE: i128 = pow10(D);
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(pow10(D));

    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Whole number
    pub fn from_int(value: i128) -> Result<Self, FixedError> {
        value
            .checked_mul(Self::SCALE)
            .map(Self)
            .ok_or(FixedError::Overflow)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn checked_neg(self) -> Result<Self, FixedError> {
        self.0.checked_neg().map(Self).ok_or(FixedError::Overflow)
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, FixedError> {
        self.0.checked_add(rhs.0).map(Self).ok_or(FixedError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, FixedError> {
        self.0.checked_sub(rhs.0).map(Self).ok_or(FixedError::Overflow)
    }

    /// Multiply by a plain integer (e.g. a block count)
    pub fn checked_mul_int(self, n: i128) -> Result<Self, FixedError> {
        self.0.checked_mul(n).map(Self).ok_or(FixedError::Overflow)
    }

    /// self * rhs, result kept at this precision
    pub fn mul<const E: u32>(self, rhs: Fixed<E>, rounding: Rounding) -> Result<Self, FixedError> {
        mul_div(self.0, rhs.0, Fixed::<E>::SCALE, rounding)
            .map(Self)
            .ok_or(FixedError::Overflow)
    }

    /// self / rhs, result kept at this precision
    pub fn div<const E: u32>(self, rhs: Fixed<E>, rounding: Rounding) -> Result<Self, FixedError> {
        if rhs.0 == 0 {
            return Err(FixedError::Overflow);
        }
        mul_div(self.0, Fixed::<E>::SCALE, rhs.0, rounding)
            .map(Self)
            .ok_or(FixedError::Overflow)
    }

    /// Change precision; widening is exact, narrowing rounds as requested
    pub fn rescale<const TO: u32>(self, rounding: Rounding) -> Result<Fixed<TO>, FixedError> {
        if TO >= D {
            self.0
                .checked_mul(pow10(TO - D))
                .map(Fixed::<TO>)
                .ok_or(FixedError::Overflow)
        } else {
            div_round(self.0, pow10(D - TO), rounding)
                .map(Fixed::<TO>)
                .ok_or(FixedError::Overflow)
        }
    }

    /// Widen to 24 digits
    pub fn to_high_precision(self) -> Result<HighPrecision, FixedError> {
        self.rescale::<24>(Rounding::TowardZero)
    }

    pub fn min(self, other: Self) -> Self {
        if self < other { self } else { other }
    }

    pub fn max(self, other: Self) -> Self {
        if self > other { self } else { other }
    }
}

impl<const D: u32> fmt::Display for Fixed<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = Self::SCALE as u128;
        let int_part = magnitude / scale;
        if D == 0 {
            return write!(f, "{}{}", sign, int_part);
        }
        let frac_part = magnitude % scale;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            int_part,
            frac_part,
            width = D as usize
        )
    }
}

impl<const D: u32> fmt::Debug for Fixed<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<const D: u32> FromStr for Fixed<D> {
    type Err = FixedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_str, frac_str) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_str.is_empty() && frac_str.is_empty() {
            return Err(FixedError::Parse(s.to_string()));
        }
        if !int_str.bytes().all(|b| b.is_ascii_digit())
            || !frac_str.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(FixedError::Parse(s.to_string()));
        }
        if frac_str.len() > D as usize {
            return Err(FixedError::Precision(s.to_string(), D));
        }

        let mut raw: i128 = 0;
        for b in int_str.bytes() {
            raw = raw
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as i128))
                .ok_or(FixedError::Overflow)?;
        }
        raw = raw.checked_mul(Self::SCALE).ok_or(FixedError::Overflow)?;

        let mut frac: i128 = 0;
        for b in frac_str.bytes() {
            frac = frac * 10 + (b - b'0') as i128;
        }
        frac *= pow10(D - frac_str.len() as u32);
        raw = raw.checked_add(frac).ok_or(FixedError::Overflow)?;

        Ok(Self(if negative { -raw } else { raw }))
    }
}

impl<const D: u32> Serialize for Fixed<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct FixedVisitor<const D: u32>;

impl<'de, const D: u32> Visitor<'de> for FixedVisitor<D> {
    type Value = Fixed<D>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a decimal with at most {} fractional digits", D)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Fixed::from_int(v as i128).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Fixed::from_int(v as i128).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        format!("{}", v).parse().map_err(E::custom)
    }
}

impl<'de, const D: u32> Deserialize<'de> for Fixed<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        deserializer.deserialize_any(FixedVisitor::<D>)
    }
}
