//! # Fixed-Point Amounts
//!
//! Token balances, reward credits and payments are all carried as [`Amount`]:
//! a signed decimal with exactly 18 fractional digits stored as an `i128`
//! count of the smallest unit (`10^-18`).
//!
//! Human-readable serializers (JSON) see a decimal string such as `"12.5"`;
//! binary serializers (bincode) see the raw `i128`.

use crate::errors::AmountError;
use primitive_types::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits every amount carries.
pub const DECIMALS: u32 = 18;

const SCALE: i128 = 10i128.pow(DECIMALS);

/// Signed fixed-point decimal with 18 fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Build from a raw count of `10^-18` units.
    pub const fn from_raw(raw: i128) -> Self {
        Amount(raw)
    }

    /// Raw count of `10^-18` units.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Build from a whole number of tokens.
    pub const fn from_whole(units: i64) -> Self {
        Amount(units as i128 * SCALE)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_neg(self) -> Option<Amount> {
        self.0.checked_neg().map(Amount)
    }

    /// Sum a sequence of amounts, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Amount, AmountError>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts.into_iter().try_fold(Amount::ZERO, |acc, next| {
            acc.checked_add(next).ok_or(AmountError::Overflow)
        })
    }

    /// Compute `self * numerator / denominator`, truncating toward zero.
    ///
    /// The intermediate product is held in 256 bits, so the only overflow is
    /// a quotient outside the `i128` range.
    pub fn mul_div_down(self, numerator: Amount, denominator: Amount) -> Result<Amount, AmountError> {
        if denominator.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let negative = (self.0 < 0) ^ (numerator.0 < 0) ^ (denominator.0 < 0);
        let product = U256::from(self.0.unsigned_abs()) * U256::from(numerator.0.unsigned_abs());
        let quotient = product / U256::from(denominator.0.unsigned_abs());

        if quotient > U256::from(i128::MAX as u128) {
            return Err(AmountError::Overflow);
        }
        let magnitude = quotient.low_u128() as i128;
        Ok(Amount(if negative { -magnitude } else { magnitude }))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || AmountError::Malformed {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(malformed());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }

        // Trailing zeros carry no precision.
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > DECIMALS as usize {
            return Err(AmountError::TooManyDecimals {
                input: input.to_string(),
                digits: fraction.len(),
            });
        }

        let mut raw: i128 = 0;
        for digit in whole.bytes() {
            raw = raw
                .checked_mul(10)
                .and_then(|r| r.checked_add(i128::from(digit - b'0')))
                .ok_or(AmountError::Overflow)?;
        }
        raw = raw.checked_mul(SCALE).ok_or(AmountError::Overflow)?;

        let mut frac: i128 = 0;
        for digit in fraction.bytes() {
            frac = frac * 10 + i128::from(digit - b'0');
        }
        frac *= 10i128.pow(DECIMALS - fraction.len() as u32);
        raw = raw.checked_add(frac).ok_or(AmountError::Overflow)?;

        Ok(Amount(if negative { -raw } else { raw }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / SCALE as u128;
        let fraction = magnitude % SCALE as u128;

        if fraction == 0 {
            write!(f, "{sign}{whole}")
        } else {
            let digits = format!("{fraction:018}");
            write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_i128(self.0)
        }
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal amount with at most 18 fractional digits")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
        Ok(Amount::from_whole(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
        i64::try_from(value)
            .map(Amount::from_whole)
            .map_err(|_| E::custom(AmountError::Overflow))
    }

    fn visit_i128<E: de::Error>(self, value: i128) -> Result<Amount, E> {
        Ok(Amount(value))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            deserializer.deserialize_i128(AmountVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(amount("100").to_string(), "100");
        assert_eq!(amount("-30").to_string(), "-30");
        assert_eq!(amount("0.5").to_string(), "0.5");
        assert_eq!(amount(".25").to_string(), "0.25");
        assert_eq!(amount("+7.").to_string(), "7");
        assert_eq!(amount("0.000000000000000001").raw(), 1);
        assert_eq!(amount("-0.000000000000000001").raw(), -1);
        assert_eq!(amount("1.500000000000000000000").to_string(), "1.5");
    }

    #[test]
    fn test_rejects_excess_precision() {
        let err = "0.0000000000000000001".parse::<Amount>().unwrap_err();
        assert!(matches!(err, AmountError::TooManyDecimals { digits: 19, .. }));
    }

    #[test]
    fn test_rejects_malformed_input() {
        for input in ["", "-", ".", "1.2.3", "abc", "1e5", "--1", "1 000"] {
            assert!(
                matches!(input.parse::<Amount>(), Err(AmountError::Malformed { .. })),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn test_rejects_overflow() {
        let huge = "1".repeat(40);
        assert_eq!(huge.parse::<Amount>(), Err(AmountError::Overflow));
        assert_eq!(Amount::from_raw(i128::MAX).checked_add(Amount::from_raw(1)), None);
    }

    #[test]
    fn test_mul_div_rounds_toward_zero() {
        // 10 * 1 / 3 = 3.333... truncated at the 18th digit
        let share = amount("10").mul_div_down(amount("1"), amount("3")).unwrap();
        assert_eq!(share.to_string(), "3.333333333333333333");

        let negative = amount("-10").mul_div_down(amount("1"), amount("3")).unwrap();
        assert_eq!(negative.to_string(), "-3.333333333333333333");

        assert_eq!(
            amount("1").mul_div_down(amount("1"), Amount::ZERO),
            Err(AmountError::DivisionByZero)
        );
    }

    #[test]
    fn test_mul_div_uses_wide_intermediate() {
        let big = Amount::from_whole(1_000_000_000_000);
        let result = big.mul_div_down(big, big).unwrap();
        assert_eq!(result, big);
    }

    #[test]
    fn test_checked_sum() {
        let total = Amount::checked_sum([amount("100"), amount("-30"), amount("0.5")]).unwrap();
        assert_eq!(total, amount("70.5"));

        let overflow = Amount::checked_sum([Amount::from_raw(i128::MAX), Amount::from_raw(1)]);
        assert_eq!(overflow, Err(AmountError::Overflow));
    }

    #[test]
    fn test_json_uses_decimal_strings() {
        let json = serde_json::to_string(&amount("12.5")).unwrap();
        assert_eq!(json, "\"12.5\"");

        let parsed: Amount = serde_json::from_str("\"-0.75\"").unwrap();
        assert_eq!(parsed, amount("-0.75"));

        let whole: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(whole, Amount::from_whole(42));

        assert!(serde_json::from_str::<Amount>("\"0.1234567890123456789\"").is_err());
    }

    #[test]
    fn test_bincode_uses_raw_units() {
        let value = amount("3.000000000000000007");
        let bytes = bincode::serialize(&value).unwrap();
        assert_eq!(bytes.len(), 16);
        let decoded: Amount = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, value);
    }
}
