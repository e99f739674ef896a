//! Exact tagged numerics for the Slate value model.
//!
//! Integers stay `i64`, `/`-fractions stay exact rationals, and decimal
//! literals use `rust_decimal::Decimal` -- never `f64` in the value path.
//! Promotion is one-way: Int -> Fraction -> Decimal. Arithmetic is checked;
//! `None` means the operation overflowed or divided by zero and the caller
//! turns that into a positioned error.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A Slate number: integer, exact fraction, or decimal.
///
/// Fractions are kept normalized: positive denominator, gcd-reduced, and a
/// denominator of 1 collapses back to `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Num {
    Int(i64),
    Fraction(i64, i64),
    Decimal(Decimal),
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.abs().max(1)
}

impl Num {
    /// Build a normalized fraction. Returns `None` on zero denominator.
    pub fn fraction(num: i64, den: i64) -> Option<Num> {
        if den == 0 {
            return None;
        }
        let sign = if den < 0 { -1 } else { 1 };
        let (num, den) = (num.checked_mul(sign)?, den.checked_mul(sign)?);
        let g = gcd(num, den);
        let (num, den) = (num / g, den / g);
        Some(if den == 1 {
            Num::Int(num)
        } else {
            Num::Fraction(num, den)
        })
    }

    /// Parse a numeric literal: digits, optional single fractional dot.
    /// `/`-fractions are assembled by the scanner from two int literals.
    pub fn parse(text: &str) -> Option<Num> {
        if text.contains('.') {
            text.parse::<Decimal>().ok().map(Num::Decimal)
        } else {
            text.parse::<i64>().ok().map(Num::Int)
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Num::Int(n) => n == 0,
            Num::Fraction(n, _) => n == 0,
            Num::Decimal(d) => d.is_zero(),
        }
    }

    pub fn to_decimal(&self) -> Decimal {
        match *self {
            Num::Int(n) => Decimal::from(n),
            Num::Fraction(n, d) => {
                Decimal::from(n)
                    .checked_div(Decimal::from(d))
                    .unwrap_or_default()
            }
            Num::Decimal(d) => d,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match *self {
            Num::Int(n) => n as f64,
            Num::Fraction(n, d) => n as f64 / d as f64,
            Num::Decimal(d) => d.to_f64().unwrap_or(0.0),
        }
    }

    pub fn from_f64(v: f64) -> Num {
        if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            Num::Int(v as i64)
        } else {
            Decimal::from_f64(v).map(Num::Decimal).unwrap_or(Num::Int(0))
        }
    }

    /// Integer view, when the number is a whole value.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Num::Int(n) => Some(n),
            Num::Fraction(..) => None,
            Num::Decimal(d) => {
                if d.fract().is_zero() {
                    d.to_i64()
                } else {
                    None
                }
            }
        }
    }

    fn as_fraction(&self) -> Option<(i64, i64)> {
        match *self {
            Num::Int(n) => Some((n, 1)),
            Num::Fraction(n, d) => Some((n, d)),
            Num::Decimal(_) => None,
        }
    }

    pub fn neg(&self) -> Num {
        match *self {
            Num::Int(n) => Num::Int(-n),
            Num::Fraction(n, d) => Num::Fraction(-n, d),
            Num::Decimal(d) => Num::Decimal(-d),
        }
    }

    pub fn add(&self, rhs: &Num) -> Option<Num> {
        match (self.as_fraction(), rhs.as_fraction()) {
            (Some((an, ad)), Some((bn, bd))) => {
                Num::fraction(an.checked_mul(bd)?.checked_add(bn.checked_mul(ad)?)?, ad.checked_mul(bd)?)
            }
            _ => self.to_decimal().checked_add(rhs.to_decimal()).map(Num::normalize_decimal),
        }
    }

    pub fn sub(&self, rhs: &Num) -> Option<Num> {
        self.add(&rhs.neg())
    }

    pub fn mul(&self, rhs: &Num) -> Option<Num> {
        match (self.as_fraction(), rhs.as_fraction()) {
            (Some((an, ad)), Some((bn, bd))) => {
                Num::fraction(an.checked_mul(bn)?, ad.checked_mul(bd)?)
            }
            _ => self.to_decimal().checked_mul(rhs.to_decimal()).map(Num::normalize_decimal),
        }
    }

    /// Exact division: Int / Int yields a Fraction, not a rounded decimal.
    pub fn div(&self, rhs: &Num) -> Option<Num> {
        if rhs.is_zero() {
            return None;
        }
        match (self.as_fraction(), rhs.as_fraction()) {
            (Some((an, ad)), Some((bn, bd))) => {
                Num::fraction(an.checked_mul(bd)?, ad.checked_mul(bn)?)
            }
            _ => self.to_decimal().checked_div(rhs.to_decimal()).map(Num::normalize_decimal),
        }
    }

    pub fn rem(&self, rhs: &Num) -> Option<Num> {
        if rhs.is_zero() {
            return None;
        }
        match (*self, *rhs) {
            (Num::Int(a), Num::Int(b)) => Some(Num::Int(a % b)),
            _ => self.to_decimal().checked_rem(rhs.to_decimal()).map(Num::normalize_decimal),
        }
    }

    /// Wrap a decimal, collapsing whole values to `Int`.
    pub fn from_decimal(d: Decimal) -> Num {
        Num::normalize_decimal(d)
    }

    /// A decimal with no fractional part collapses to Int so `6.0` and `6`
    /// compare and print identically.
    fn normalize_decimal(d: Decimal) -> Num {
        if d.fract().is_zero() {
            d.to_i64().map(Num::Int).unwrap_or(Num::Decimal(d))
        } else {
            Num::Decimal(d.normalize())
        }
    }

    pub fn compare(&self, rhs: &Num) -> Ordering {
        match (self.as_fraction(), rhs.as_fraction()) {
            (Some((an, ad)), Some((bn, bd))) => (an as i128 * bd as i128).cmp(&(bn as i128 * ad as i128)),
            _ => self.to_decimal().cmp(&rhs.to_decimal()),
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Num::Int(n) => write!(f, "{}", n),
            Num::Fraction(n, d) => write!(f, "{}/{}", n, d),
            Num::Decimal(d) => write!(f, "{}", d.normalize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_addition_stays_exact() {
        let half = Num::fraction(1, 2).unwrap();
        let three_quarters = Num::fraction(3, 4).unwrap();
        assert_eq!(half.add(&three_quarters), Some(Num::Fraction(5, 4)));
    }

    #[test]
    fn whole_fraction_collapses_to_int() {
        assert_eq!(Num::fraction(4, 2), Some(Num::Int(2)));
        assert_eq!(Num::fraction(-6, -3), Some(Num::Int(2)));
    }

    #[test]
    fn negative_denominator_normalizes() {
        assert_eq!(Num::fraction(1, -2), Some(Num::Fraction(-1, 2)));
    }

    #[test]
    fn int_division_yields_fraction() {
        let a = Num::Int(1);
        let b = Num::Int(3);
        assert_eq!(a.div(&b), Some(Num::Fraction(1, 3)));
    }

    #[test]
    fn division_by_zero_is_none() {
        assert_eq!(Num::Int(1).div(&Num::Int(0)), None);
    }

    #[test]
    fn decimal_contaminates() {
        let d = Num::parse("1.5").unwrap();
        let sum = d.add(&Num::Int(1)).unwrap();
        assert_eq!(sum.to_string(), "2.5");
    }

    #[test]
    fn whole_decimal_result_prints_as_int() {
        let d = Num::parse("1.5").unwrap();
        assert_eq!(d.add(&d).unwrap().to_string(), "3");
    }

    #[test]
    fn compare_cross_variant() {
        let half = Num::fraction(1, 2).unwrap();
        assert_eq!(half.compare(&Num::parse("0.5").unwrap()), Ordering::Equal);
        assert_eq!(Num::Int(2).compare(&half), Ordering::Greater);
    }
}
