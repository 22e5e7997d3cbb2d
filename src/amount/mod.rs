//! Fixed-point ledger amounts
//!
//! Amounts are stored as a count of fraction units (10^7 per whole unit) in a
//! u64, optionally tagged with the asset they denominate. Every constructor and
//! arithmetic operation reports overflow instead of wrapping.

mod asset;
mod price;

pub use asset::{AssetId, MAX_CODE_LEN, NATIVE_CODE};
pub use price::Price;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fraction units per whole unit
pub const FRACTION_UNITS_PER_UNIT: u64 = 10_000_000;

/// Number of fractional digits in the canonical rendering
pub const FRACTION_DIGITS: u32 = 7;

/// Largest whole-unit count that can be represented
pub const MAX_UNITS: u64 = u64::MAX / FRACTION_UNITS_PER_UNIT;

lazy_static! {
    static ref AMOUNT_PATTERN: Regex = Regex::new(r"^([0-9]+)(?:\.([0-9]+))?$").unwrap();
}

/// Errors produced by amount construction and arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Malformed amount {0:?}: expected digits with an optional fraction, e.g. 1234.5678901")]
    Malformed(String),

    #[error("Fraction {0} out of range: must be below 10^7")]
    FractionOutOfRange(u64),

    #[error("Amount overflow: exceeds {} fraction units", u64::MAX)]
    Overflow,

    #[error("Amount underflow: result would be negative")]
    Underflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Value {0} cannot be represented as an amount")]
    NotRepresentable(String),

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Invalid price {numerator}/{denominator}")]
    InvalidPrice { numerator: u64, denominator: u64 },
}

/// Exact ledger quantity with an optional asset tag.
///
/// Equality requires the same quantity and the same asset, where an untagged
/// amount only equals another untagged amount. Ordering compares quantities;
/// differently tagged amounts of equal quantity are unordered. Use
/// [`FixedAmount::cmp_quantity`] for a total order on quantity alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AmountRepr", into = "AmountRepr")]
pub struct FixedAmount {
    total: u64,
    asset: Option<AssetId>,
}

impl FixedAmount {
    /// Largest representable untagged amount
    pub const MAX: FixedAmount = FixedAmount {
        total: u64::MAX,
        asset: None,
    };

    /// Create an amount from whole units and fraction units
    pub fn new(units: u64, fraction: u32, asset: Option<AssetId>) -> Result<Self, AmountError> {
        let fraction = fraction as u64;
        if fraction >= FRACTION_UNITS_PER_UNIT {
            return Err(AmountError::FractionOutOfRange(fraction));
        }

        let total = units
            .checked_mul(FRACTION_UNITS_PER_UNIT)
            .and_then(|t| t.checked_add(fraction))
            .ok_or(AmountError::Overflow)?;

        Ok(Self { total, asset })
    }

    /// Create an amount from a raw count of fraction units
    pub fn from_fraction_units(total: u64, asset: Option<AssetId>) -> Self {
        Self { total, asset }
    }

    pub fn zero(asset: Option<AssetId>) -> Self {
        Self { total: 0, asset }
    }

    /// Parse an untagged amount from a decimal string
    pub fn parse(text: &str) -> Result<Self, AmountError> {
        Self::parse_with_asset(text, None)
    }

    /// Parse a decimal string like `12.5`.
    ///
    /// Fractional digits beyond the seventh are truncated, never rounded.
    pub fn parse_with_asset(text: &str, asset: Option<AssetId>) -> Result<Self, AmountError> {
        let captures = AMOUNT_PATTERN
            .captures(text)
            .ok_or_else(|| AmountError::Malformed(text.to_string()))?;

        // the pattern guarantees digits only, so a failed parse is an overflow
        let units: u64 = captures[1].parse().map_err(|_| AmountError::Overflow)?;

        let fraction = match captures.get(2) {
            Some(digits) => {
                let padded: String = digits
                    .as_str()
                    .chars()
                    .chain(std::iter::repeat('0'))
                    .take(FRACTION_DIGITS as usize)
                    .collect();
                padded
                    .parse::<u32>()
                    .map_err(|_| AmountError::Malformed(text.to_string()))?
            }
            None => 0,
        };

        Self::new(units, fraction, asset)
    }

    /// Convert a floating point value, truncating toward zero.
    ///
    /// Lossy: binary floating point cannot represent most decimal fractions, so
    /// very small fractional parts may come out one unit low.
    pub fn from_double(value: f64, asset: Option<AssetId>) -> Result<Self, AmountError> {
        if !value.is_finite() || value < 0.0 {
            return Err(AmountError::NotRepresentable(value.to_string()));
        }

        let scaled = (value * FRACTION_UNITS_PER_UNIT as f64).trunc();
        // u64::MAX as f64 rounds up to 2^64, which is itself out of range
        if scaled >= u64::MAX as f64 {
            return Err(AmountError::Overflow);
        }

        Ok(Self {
            total: scaled as u64,
            asset,
        })
    }

    /// Whole units
    pub fn units(&self) -> u64 {
        self.total / FRACTION_UNITS_PER_UNIT
    }

    /// Fraction units below one whole unit
    pub fn fraction(&self) -> u32 {
        (self.total % FRACTION_UNITS_PER_UNIT) as u32
    }

    /// Canonical comparable quantity: `units * 10^7 + fraction`
    pub fn total_fraction_units(&self) -> u64 {
        self.total
    }

    pub fn asset(&self) -> Option<&AssetId> {
        self.asset.as_ref()
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0
    }

    /// Same quantity tagged with another asset
    pub fn with_asset(&self, asset: Option<AssetId>) -> Self {
        Self {
            total: self.total,
            asset,
        }
    }

    /// Quantity without the asset tag, rendered with exactly seven fraction digits
    pub fn amount_string(&self) -> String {
        format!("{}.{:07}", self.units(), self.fraction())
    }

    /// Compare quantities, ignoring asset tags
    pub fn cmp_quantity(&self, other: &Self) -> Ordering {
        self.total.cmp(&other.total)
    }

    pub fn add(&self, other: &Self) -> Result<Self, AmountError> {
        let total = self
            .total
            .checked_add(other.total)
            .ok_or(AmountError::Overflow)?;
        Ok(Self {
            total,
            asset: self.shared_asset(other),
        })
    }

    pub fn sub(&self, other: &Self) -> Result<Self, AmountError> {
        let total = self
            .total
            .checked_sub(other.total)
            .ok_or(AmountError::Underflow)?;
        Ok(Self {
            total,
            asset: self.shared_asset(other),
        })
    }

    pub fn mul(&self, other: &Self) -> Result<Self, AmountError> {
        let product = self
            .to_decimal()
            .checked_mul(other.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Self::from_decimal(product, self.shared_asset(other))
    }

    pub fn div(&self, other: &Self) -> Result<Self, AmountError> {
        if other.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let quotient = self
            .to_decimal()
            .checked_div(other.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Self::from_decimal(quotient, self.shared_asset(other))
    }

    pub fn rem(&self, other: &Self) -> Result<Self, AmountError> {
        if other.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let remainder = self
            .to_decimal()
            .checked_rem(other.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Self::from_decimal(remainder, self.shared_asset(other))
    }

    /// `1 / self`, untagged
    pub fn inverse(&self) -> Result<Self, AmountError> {
        if self.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let inverse = Decimal::ONE
            .checked_div(self.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Self::from_decimal(inverse, None)
    }

    /// Scale by `numerator / denominator` and tag the result with `target`.
    ///
    /// Uses a 128-bit intermediate so the product cannot overflow before the
    /// division; the quotient is truncated.
    pub fn convert(
        &self,
        numerator: u64,
        denominator: u64,
        target: Option<AssetId>,
    ) -> Result<Self, AmountError> {
        if denominator == 0 {
            return Err(AmountError::DivisionByZero);
        }
        let scaled = self.total as u128 * numerator as u128 / denominator as u128;
        let total = u64::try_from(scaled).map_err(|_| AmountError::Overflow)?;
        Ok(Self {
            total,
            asset: target,
        })
    }

    /// Convert at a ledger price into the buying asset
    pub fn convert_at(&self, price: &Price, target: Option<AssetId>) -> Result<Self, AmountError> {
        self.convert(price.numerator as u64, price.denominator as u64, target)
    }

    fn shared_asset(&self, other: &Self) -> Option<AssetId> {
        if self.asset == other.asset {
            self.asset.clone()
        } else {
            None
        }
    }

    fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.total as i128, FRACTION_DIGITS)
    }

    /// Single truncation point back into fraction units
    fn from_decimal(value: Decimal, asset: Option<AssetId>) -> Result<Self, AmountError> {
        let truncated = value.round_dp_with_strategy(FRACTION_DIGITS, RoundingStrategy::ToZero);
        if truncated.is_sign_negative() && !truncated.is_zero() {
            return Err(AmountError::Underflow);
        }

        let scale_up = 10i128.pow(FRACTION_DIGITS - truncated.scale());
        let total = truncated
            .mantissa()
            .checked_mul(scale_up)
            .ok_or(AmountError::Overflow)?;
        let total = u64::try_from(total).map_err(|_| AmountError::Overflow)?;

        Ok(Self { total, asset })
    }
}

impl PartialOrd for FixedAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.total.cmp(&other.total) {
            Ordering::Equal if self.asset != other.asset => None,
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for FixedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:07}", self.units(), self.fraction())?;
        if let Some(asset) = &self.asset {
            write!(f, " {}", asset)?;
        }
        Ok(())
    }
}

impl FromStr for FixedAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Wire form: the quantity as a decimal string so JSON never sees a float
#[derive(Serialize, Deserialize)]
struct AmountRepr {
    amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset: Option<AssetId>,
}

impl TryFrom<AmountRepr> for FixedAmount {
    type Error = AmountError;

    fn try_from(repr: AmountRepr) -> Result<Self, Self::Error> {
        FixedAmount::parse_with_asset(&repr.amount, repr.asset)
    }
}

impl From<FixedAmount> for AmountRepr {
    fn from(amount: FixedAmount) -> Self {
        AmountRepr {
            amount: amount.amount_string(),
            asset: amount.asset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(text: &str) -> FixedAmount {
        FixedAmount::parse(text).unwrap()
    }

    fn usd() -> AssetId {
        AssetId::credit("USD", "issuer-usd").unwrap()
    }

    fn eur() -> AssetId {
        AssetId::credit("EUR", "issuer-eur").unwrap()
    }

    #[test]
    fn test_formatting() {
        assert_eq!(FixedAmount::new(0, 0, None).unwrap().to_string(), "0.0000000");
        assert_eq!(FixedAmount::new(10, 1, None).unwrap().to_string(), "10.0000001");
        assert_eq!(FixedAmount::new(10, 666, None).unwrap().to_string(), "10.0000666");
        assert_eq!(FixedAmount::new(1, 9_999_999, None).unwrap().to_string(), "1.9999999");
        assert_eq!(
            FixedAmount::new(MAX_UNITS - 1, 9_999_999, None).unwrap().to_string(),
            "1844674407369.9999999"
        );
    }

    #[test]
    fn test_display_appends_asset_code() {
        let amount = FixedAmount::new(10, 1, Some(usd())).unwrap();
        assert_eq!(amount.to_string(), "10.0000001 USD");
        assert_eq!(amount.amount_string(), "10.0000001");

        let native = FixedAmount::new(20, 0, Some(AssetId::Native)).unwrap();
        assert_eq!(native.to_string(), "20.0000000 XLM");
    }

    #[test]
    fn test_parse_pads_to_seven_digits() {
        for (input, expected) in [
            ("1", "1.0000000"),
            ("0", "0.0000000"),
            ("1.5", "1.5000000"),
            ("1.0000002", "1.0000002"),
            ("007.25", "7.2500000"),
            ("123456.1234567", "123456.1234567"),
        ] {
            assert_eq!(amt(input).to_string(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_parse_truncates_extra_digits() {
        assert_eq!(amt("1.99999995").to_string(), "1.9999999");
        assert_eq!(amt("0.00000009").to_string(), "0.0000000");
        assert_eq!(amt("2.123456789012").to_string(), "2.1234567");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", ".5", "1.", "-1", "1e5", " 1", "1.2.3", "abc", "1,5", "+1"] {
            assert!(
                matches!(FixedAmount::parse(input), Err(AmountError::Malformed(_))),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert_eq!(
            FixedAmount::parse("99999999999999999999999"),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            FixedAmount::parse("1844674407370.9551616"),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            amt("1844674407370.9551615").total_fraction_units(),
            u64::MAX
        );
    }

    #[test]
    fn test_overflow_boundary() {
        let fraction = (u64::MAX % FRACTION_UNITS_PER_UNIT) as u32;
        let max = FixedAmount::new(MAX_UNITS, fraction, None).unwrap();
        assert_eq!(max.total_fraction_units(), u64::MAX);
        assert_eq!(max, FixedAmount::MAX);

        assert_eq!(
            FixedAmount::new(MAX_UNITS, fraction + 1, None),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            FixedAmount::new(MAX_UNITS + 1, 0, None),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn test_fraction_range_checked() {
        assert_eq!(
            FixedAmount::new(1, 10_000_000, None),
            Err(AmountError::FractionOutOfRange(10_000_000))
        );
        assert!(FixedAmount::new(1, 9_999_999, None).is_ok());
    }

    #[test]
    fn test_add_sub_identity() {
        let pairs = [
            ("0", "0"),
            ("1.5", "2.25"),
            ("100.0000001", "0.9999999"),
            ("1844674407369", "1.9551615"),
        ];
        for (a, b) in pairs {
            let (a, b) = (amt(a), amt(b));
            assert_eq!(a.add(&b).unwrap().sub(&b).unwrap(), a);
        }

        let a = FixedAmount::new(5, 0, Some(usd())).unwrap();
        let b = FixedAmount::new(3, 5_000_000, Some(usd())).unwrap();
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.to_string(), "8.5000000 USD");
        assert_eq!(sum.sub(&b).unwrap(), a);
    }

    #[test]
    fn test_add_overflow_and_sub_underflow() {
        assert_eq!(FixedAmount::MAX.add(&amt("0.0000001")), Err(AmountError::Overflow));
        assert_eq!(amt("1").sub(&amt("1.0000001")), Err(AmountError::Underflow));
    }

    #[test]
    fn test_mixed_assets_drop_tag() {
        let a = FixedAmount::new(5, 0, Some(usd())).unwrap();
        let b = FixedAmount::new(5, 0, Some(eur())).unwrap();
        assert_eq!(a.add(&b).unwrap().asset(), None);
        assert_eq!(a.add(&amt("1")).unwrap().asset(), None);
    }

    #[test]
    fn test_asset_aware_equality() {
        let x = FixedAmount::new(5, 0, Some(usd())).unwrap();
        let y = FixedAmount::new(5, 0, Some(eur())).unwrap();
        let untagged = FixedAmount::new(5, 0, None).unwrap();

        assert_ne!(x, y);
        assert_ne!(x, untagged);
        assert_eq!(untagged, amt("5"));
        assert_eq!(x, FixedAmount::new(5, 0, Some(usd())).unwrap());
    }

    #[test]
    fn test_ordering_by_quantity() {
        assert!(amt("1.5") < amt("2"));
        assert!(amt("2") > amt("1.9999999"));

        let x = FixedAmount::new(5, 0, Some(usd())).unwrap();
        let y = FixedAmount::new(6, 0, Some(eur())).unwrap();
        assert!(x < y);

        let same_quantity = FixedAmount::new(5, 0, Some(eur())).unwrap();
        assert_eq!(x.partial_cmp(&same_quantity), None);
        assert_eq!(x.cmp_quantity(&same_quantity), Ordering::Equal);
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(amt("12.5").mul(&amt("4")).unwrap(), amt("50"));
        assert_eq!(amt("50").div(&amt("4")).unwrap(), amt("12.5"));
        assert_eq!(amt("0.0000001").mul(&amt("0.5")).unwrap(), amt("0"));
        assert_eq!(amt("10").div(&amt("3")).unwrap().to_string(), "3.3333333");

        for (a, b) in [("12.5", "4"), ("3.1415926", "2"), ("1000", "0.125"), ("7", "1")] {
            let (a, b) = (amt(a), amt(b));
            assert_eq!(a.mul(&b).unwrap().div(&b).unwrap(), a);
        }
    }

    #[test]
    fn test_mul_overflow() {
        assert_eq!(
            FixedAmount::MAX.mul(&amt("2")),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn test_rem() {
        assert_eq!(amt("10").rem(&amt("3")).unwrap(), amt("1"));
        assert_eq!(amt("10.5").rem(&amt("3")).unwrap(), amt("1.5"));
        assert_eq!(amt("1").rem(&amt("0")), Err(AmountError::DivisionByZero));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(amt("1").div(&amt("0")), Err(AmountError::DivisionByZero));
        assert_eq!(amt("0").inverse(), Err(AmountError::DivisionByZero));
    }

    #[test]
    fn test_inverse() {
        assert_eq!(amt("4").inverse().unwrap(), amt("0.25"));
        assert_eq!(amt("3").inverse().unwrap().to_string(), "0.3333333");
        assert_eq!(amt("0.5").inverse().unwrap(), amt("2"));
        assert_eq!(
            FixedAmount::new(2, 0, Some(usd())).unwrap().inverse().unwrap().asset(),
            None
        );
    }

    #[test]
    fn test_convert() {
        let hundred = FixedAmount::new(100, 0, Some(usd())).unwrap();
        let converted = hundred.convert(1, 3, Some(eur())).unwrap();
        assert_eq!(converted.to_string(), "33.3333333 EUR");

        let price = Price::new(3, 2).unwrap();
        assert_eq!(
            hundred.convert_at(&price, Some(eur())).unwrap(),
            FixedAmount::new(150, 0, Some(eur())).unwrap()
        );

        // the intermediate product exceeds 64 bits but the result does not
        let converted = FixedAmount::MAX.convert(u64::MAX, u64::MAX, None).unwrap();
        assert_eq!(converted, FixedAmount::MAX);

        assert_eq!(FixedAmount::MAX.convert(2, 1, None), Err(AmountError::Overflow));
        assert_eq!(hundred.convert(1, 0, None), Err(AmountError::DivisionByZero));
    }

    #[test]
    fn test_from_double() {
        assert_eq!(FixedAmount::from_double(1.5, None).unwrap(), amt("1.5"));
        assert_eq!(FixedAmount::from_double(100.0, None).unwrap(), amt("100"));
        assert_eq!(
            FixedAmount::from_double(2.0, Some(usd())).unwrap().asset(),
            Some(&usd())
        );
        assert!(FixedAmount::from_double(-1.0, None).is_err());
        assert!(FixedAmount::from_double(f64::NAN, None).is_err());
        assert!(FixedAmount::from_double(f64::INFINITY, None).is_err());
        assert_eq!(FixedAmount::from_double(1e13, None), Err(AmountError::Overflow));
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let amount = FixedAmount::new(10, 1, Some(usd())).unwrap();
        let json = serde_json::to_value(&amount).unwrap();
        assert_eq!(json["amount"], "10.0000001");
        assert_eq!(json["asset"]["code"], "USD");

        let back: FixedAmount = serde_json::from_value(json).unwrap();
        assert_eq!(back, amount);

        let bad: Result<FixedAmount, _> = serde_json::from_str(r#"{"amount":"-3"}"#);
        assert!(bad.is_err());
    }
}
