//! Reward units and fixed-point arithmetic.
//!
//! ## Units
//! - Rewards are counted in indivisible base units (`Amount`, u128)
//! - Voting power uses the same 18-decimal base units as the reward token
//! - Allocation fractions are fixed-point with `FIXED_POINT_SCALE` == 100%
//! - NO floating point anywhere in share computation; every division floors

use num_bigint::BigUint;
use num_traits::ToPrimitive;

// =============================================================================
// CANONICAL UNITS
// =============================================================================

/// Fixed-point scale: one whole fraction (100%) and one whole token
pub const FIXED_POINT_SCALE: u128 = 1_000_000_000_000_000_000;

/// Number of decimals carried by `FIXED_POINT_SCALE`
pub const FIXED_POINT_DECIMALS: u32 = 18;

/// One week in seconds, the default epoch cadence
pub const ONE_WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// Reward amount in base units
pub type Amount = u128;

/// Voting power in base units
pub type Power = u128;

/// Allocation fraction, `FIXED_POINT_SCALE` == 100%
pub type Fraction = u128;

/// Unix time in seconds
pub type Timestamp = u64;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// `mantissa × 10^exponent`, saturating. `scaled(2, 17)` is a 20% fraction.
#[inline]
pub const fn scaled(mantissa: u128, exponent: u32) -> u128 {
    mantissa.saturating_mul(10u128.saturating_pow(exponent))
}

/// Whole tokens to base units (saturating)
#[inline]
pub const fn units(whole: u128) -> Amount {
    scaled(whole, FIXED_POINT_DECIMALS)
}

/// `floor(a × b / div)` with a full-width intermediate.
///
/// The product of an epoch reward and a dial's weighted votes routinely exceeds
/// u128, so the slow path widens to a big integer. Returns None if the divisor is
/// zero or the quotient itself does not fit in u128.
pub fn mul_div_floor(a: u128, b: u128, div: u128) -> Option<u128> {
    if div == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / div);
    }
    let quotient = BigUint::from(a) * BigUint::from(b) / BigUint::from(div);
    quotient.to_u128()
}

/// Weight a power value by a fixed-point fraction: `floor(power × fraction / 1e18)`.
#[inline]
pub fn apply_fraction(power: Power, fraction: Fraction) -> Option<Power> {
    mul_div_floor(power, fraction, FIXED_POINT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_matches_decimal_shift() {
        assert_eq!(scaled(2, 17), FIXED_POINT_SCALE / 5);
        assert_eq!(scaled(5, 17), FIXED_POINT_SCALE / 2);
        assert_eq!(units(1), FIXED_POINT_SCALE);
        assert_eq!(scaled(u128::MAX, 2), u128::MAX);
    }

    #[test]
    fn wide_mul_div_survives_u128_overflow() {
        let epoch_reward = units(40_000_000) / 312;
        let votes = units(600);
        let total = units(900);
        assert!(epoch_reward.checked_mul(votes).is_none());
        let share = mul_div_floor(epoch_reward, votes, total).unwrap();
        assert_eq!(share, epoch_reward * 2 / 3);
    }

    #[test]
    fn wide_mul_div_rejects_unrepresentable_quotient() {
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, 1), None);
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
        assert_eq!(mul_div_floor(1, 1, 0), None);
    }

    #[test]
    fn fraction_application_floors() {
        assert_eq!(apply_fraction(units(300), scaled(2, 17)), Some(units(60)));
        assert_eq!(apply_fraction(7, FIXED_POINT_SCALE / 2), Some(3));
        assert_eq!(apply_fraction(units(300), 0), Some(0));
    }
}
