//! Exchange rates expressed as reduced fractions

use super::{AmountError, FixedAmount};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Price of one unit of the selling asset in units of the buying asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    pub numerator: u32,
    pub denominator: u32,
}

impl Price {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, AmountError> {
        if numerator == 0 || denominator == 0 {
            return Err(AmountError::InvalidPrice {
                numerator: numerator as u64,
                denominator: denominator as u64,
            });
        }
        let divisor = gcd(numerator as u64, denominator as u64) as u32;
        Ok(Self {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        })
    }

    /// Price for selling `selling` in exchange for at least `buying`.
    ///
    /// The ratio is approximated with continued fractions when it does not fit
    /// in 32-bit terms; the result is exact whenever it does.
    pub fn from_amounts(selling: &FixedAmount, buying: &FixedAmount) -> Result<Self, AmountError> {
        let p = buying.total_fraction_units();
        let q = selling.total_fraction_units();
        if q == 0 {
            return Err(AmountError::DivisionByZero);
        }
        if p == 0 {
            return Err(AmountError::InvalidPrice {
                numerator: p,
                denominator: q,
            });
        }

        let (numerator, denominator) = best_rational(p, q);
        if denominator == 0 || numerator == 0 {
            return Err(AmountError::InvalidPrice {
                numerator: p,
                denominator: q,
            });
        }
        Self::new(numerator, denominator)
    }

    pub fn invert(&self) -> Self {
        Self {
            numerator: self.denominator,
            denominator: self.numerator,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a.max(1)
}

/// Closest convergent of p/q whose terms both fit in u32
fn best_rational(p: u64, q: u64) -> (u32, u32) {
    let limit = u32::MAX as u128;
    let (mut h_prev, mut h) = (0u128, 1u128);
    let (mut k_prev, mut k) = (1u128, 0u128);
    let (mut p, mut q) = (p as u128, q as u128);

    while q != 0 {
        let a = p / q;
        let h_next = a * h + h_prev;
        let k_next = a * k + k_prev;
        if h_next > limit || k_next > limit {
            break;
        }
        h_prev = h;
        h = h_next;
        k_prev = k;
        k = k_next;

        let r = p % q;
        p = q;
        q = r;
    }

    // h, k <= limit here
    (h as u32, k as u32)
}
