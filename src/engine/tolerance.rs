//! Tolerance Arithmetic
//!
//! A tolerance is a fixed-point fraction `numerator / denominator` with
//! `numerator <= denominator`. A fresh reading violates a remembered one when
//! it falls strictly below `floor(remembered * numerator / denominator)`.
//!
//! Increases never violate. Reaching the floor exactly does not violate.

use alloy_primitives::{U256, U512};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ToleranceError;

/// Per-mille scale (500 / 1000 = 50%)
pub const PER_MILLE: u64 = 1_000;

/// 18-decimal fixed-point scale
pub const WAD: u64 = 1_000_000_000_000_000_000;

/// Fraction of a remembered value a fresh reading must stay at or above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawToleranceRatio")]
pub struct ToleranceRatio {
    numerator: U256,
    denominator: U256,
}

impl ToleranceRatio {
    /// 500 / 1000, the tolerance most deployed triggers use
    pub const HALF: Self = Self {
        numerator: U256::from_limbs([500, 0, 0, 0]),
        denominator: U256::from_limbs([1_000, 0, 0, 0]),
    };

    pub fn new(numerator: U256, denominator: U256) -> Result<Self, ToleranceError> {
        if denominator.is_zero() {
            return Err(ToleranceError::ZeroDenominator);
        }
        if numerator > denominator {
            return Err(ToleranceError::NumeratorAboveDenominator {
                numerator,
                denominator,
            });
        }

        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// `per_mille / 1000`
    pub fn per_mille(per_mille: u64) -> Result<Self, ToleranceError> {
        Self::new(U256::from(per_mille), U256::from(PER_MILLE))
    }

    /// `wad / 1e18`
    pub fn wad(wad: U256) -> Result<Self, ToleranceError> {
        Self::new(wad, U256::from(WAD))
    }

    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    /// `floor(value * numerator / denominator)`, exact for every U256 input.
    ///
    /// Products that overflow 256 bits are carried in 512. The quotient never
    /// exceeds `value` since `numerator <= denominator`.
    pub fn floor_of(&self, value: U256) -> U256 {
        match value.checked_mul(self.numerator) {
            Some(scaled) => scaled / self.denominator,
            None => {
                let scaled = U512::from(value) * U512::from(self.numerator);
                (scaled / U512::from(self.denominator)).saturating_to::<U256>()
            }
        }
    }

    /// True when `fresh` dropped below the floor derived from `remembered`
    pub fn is_violated_by(&self, remembered: U256, fresh: U256) -> bool {
        fresh < self.floor_of(remembered)
    }
}

/// Unchecked wire form; every deserialized ratio goes through `new`
#[derive(Deserialize)]
struct RawToleranceRatio {
    numerator: U256,
    denominator: U256,
}

impl TryFrom<RawToleranceRatio> for ToleranceRatio {
    type Error = ToleranceError;

    fn try_from(raw: RawToleranceRatio) -> Result<Self, Self::Error> {
        Self::new(raw.numerator, raw.denominator)
    }
}

impl fmt::Display for ToleranceRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// `new < floor(old * tol)`
///
/// Also used for drain checks with `old` bound to the internally tracked
/// balance and `new` bound to the real custody balance.
pub fn violates(old: U256, new: U256, tolerance: &ToleranceRatio) -> bool {
    tolerance.is_violated_by(old, new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half() -> ToleranceRatio {
        ToleranceRatio::HALF
    }

    #[test]
    fn test_boundary_is_not_a_violation() {
        let old = U256::from(1000u64);

        // floor(1000 * 500 / 1000) = 500
        assert!(!violates(old, U256::from(500u64), &half()));
        assert!(violates(old, U256::from(499u64), &half()));
    }

    #[test]
    fn test_increase_never_violates() {
        let tolerances = [
            ToleranceRatio::per_mille(0).unwrap(),
            half(),
            ToleranceRatio::per_mille(1000).unwrap(),
        ];

        for tol in tolerances {
            assert!(!violates(U256::from(1000u64), U256::from(1001u64), &tol));
            assert!(!violates(U256::from(1000u64), U256::MAX, &tol));
        }
    }

    #[test]
    fn test_odd_value_rounds_floor_down() {
        // floor(1001 * 0.5) = 500, so 500 is still fine
        let old = U256::from(1001u64);
        assert_eq!(half().floor_of(old), U256::from(500u64));
        assert!(!violates(old, U256::from(500u64), &half()));
        assert!(violates(old, U256::from(499u64), &half()));
    }

    #[test]
    fn test_full_tolerance_flags_any_drop() {
        let exact = ToleranceRatio::per_mille(1000).unwrap();
        let old = U256::from(1_000_000u64);

        assert!(!violates(old, old, &exact));
        assert!(violates(old, old - U256::from(1u64), &exact));
    }

    #[test]
    fn test_wad_scale_matches_per_mille() {
        let wad_half = ToleranceRatio::wad(U256::from(WAD / 2)).unwrap();
        let price = U256::from(1_020_000_000_000_000_000u64);

        assert_eq!(wad_half.floor_of(price), half().floor_of(price));
    }

    #[test]
    fn test_floor_does_not_overflow_near_max() {
        let floor = half().floor_of(U256::MAX);

        // MAX is odd, so half of it floors to MAX / 2
        assert_eq!(floor, U256::MAX / U256::from(2u64));
        assert!(!violates(U256::MAX, floor, &half()));
        assert!(violates(U256::MAX, floor - U256::from(1u64), &half()));
    }

    #[test]
    fn test_floor_is_exact_with_huge_denominator() {
        // den = 2^200, num = den - 1: remainder * num no longer fits in 256 bits
        let den = U256::from(1u64) << 200;
        let tol = ToleranceRatio::new(den - U256::from(1u64), den).unwrap();
        let value = U256::MAX;

        // floor(MAX * (den - 1) / den) = MAX - ceil(MAX / den)
        let ceil = value / den + if (value % den).is_zero() { U256::ZERO } else { U256::from(1u64) };
        let expected = value - ceil;

        assert_eq!(tol.floor_of(value), expected);
        assert!(!violates(value, expected, &tol));
        assert!(violates(value, expected - U256::from(1u64), &tol));
    }

    #[test]
    fn test_deserialize_rejects_invalid_ratio() {
        let zero_den = serde_json::from_str::<ToleranceRatio>(r#"{"numerator":"0x5","denominator":"0x0"}"#);
        assert!(zero_den.is_err());

        let above = serde_json::from_str::<ToleranceRatio>(
            r#"{"numerator":"0x3e9","denominator":"0x3e8"}"#,
        );
        assert!(above.is_err());

        let json = serde_json::to_string(&ToleranceRatio::HALF).unwrap();
        assert_eq!(serde_json::from_str::<ToleranceRatio>(&json).unwrap(), ToleranceRatio::HALF);
    }

    #[test]
    fn test_half_constant() {
        assert_eq!(ToleranceRatio::HALF, ToleranceRatio::per_mille(500).unwrap());
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        assert_eq!(
            ToleranceRatio::new(U256::from(1001u64), U256::from(1000u64)),
            Err(ToleranceError::NumeratorAboveDenominator {
                numerator: U256::from(1001u64),
                denominator: U256::from(1000u64),
            })
        );
        assert_eq!(
            ToleranceRatio::new(U256::ZERO, U256::ZERO),
            Err(ToleranceError::ZeroDenominator)
        );
    }
}
