//! Q16.16 fixed-point arithmetic.
//!
//! Every value that crosses into the real-time context (voltages, ramp
//! progress, ASL operands) is carried as `Q16`. Conversions to and from
//! `f32` exist for the control side only.

use core::fmt;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Fractional bits.
pub const Q16_SHIFT: u32 = 16;

/// Signed 16.16 fixed-point number.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Q16(pub i32);

impl Q16 {
    pub const ZERO: Q16 = Q16(0);
    pub const ONE: Q16 = Q16(1 << Q16_SHIFT);
    pub const HALF: Q16 = Q16(1 << (Q16_SHIFT - 1));
    pub const MAX: Q16 = Q16(i32::MAX);
    pub const MIN: Q16 = Q16(i32::MIN);

    /// Whole number to fixed point.
    pub const fn from_int(n: i32) -> Self {
        Q16(n << Q16_SHIFT)
    }

    /// Ratio `num / den` as fixed point. A zero denominator yields zero.
    pub const fn from_ratio(num: i64, den: i64) -> Self {
        if den == 0 {
            return Q16::ZERO;
        }
        Q16(((num << Q16_SHIFT) / den) as i32)
    }

    /// Round-to-nearest conversion from float (control side only).
    pub fn from_f32(f: f32) -> Self {
        let scaled = f * (1u32 << Q16_SHIFT) as f32;
        let rounded = if scaled >= 0.0 { scaled + 0.5 } else { scaled - 0.5 };
        // `as` saturates on overflow and maps NaN to 0.
        Q16(rounded as i32)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / (1u32 << Q16_SHIFT) as f32
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Fixed-point multiply with a 64-bit intermediate.
    pub const fn mul(self, rhs: Q16) -> Q16 {
        Q16(((self.0 as i64 * rhs.0 as i64) >> Q16_SHIFT) as i32)
    }

    /// Fixed-point divide. Division by zero yields zero.
    pub const fn div(self, rhs: Q16) -> Q16 {
        if rhs.0 == 0 {
            return Q16::ZERO;
        }
        Q16((((self.0 as i64) << Q16_SHIFT) / rhs.0 as i64) as i32)
    }

    /// Largest whole value not greater than `self`.
    pub const fn floor(self) -> Q16 {
        Q16((self.0 >> Q16_SHIFT) << Q16_SHIFT)
    }

    /// Integer part, rounded toward negative infinity.
    pub const fn floor_int(self) -> i32 {
        self.0 >> Q16_SHIFT
    }

    /// Fractional part in `[0, 1)`.
    pub const fn fract(self) -> Q16 {
        Q16(self.0 & ((1 << Q16_SHIFT) - 1))
    }

    pub const fn abs(self) -> Q16 {
        Q16(self.0.wrapping_abs())
    }

    pub fn clamp(self, lo: Q16, hi: Q16) -> Q16 {
        Q16(self.0.clamp(lo.0, hi.0))
    }

    /// Floored modulo: `self - wrap * floor(self / wrap)`.
    /// A zero `wrap` returns `self` unchanged.
    pub const fn rem_floor(self, wrap: Q16) -> Q16 {
        if wrap.0 == 0 {
            return self;
        }
        let quotient = self.div(wrap).floor();
        Q16(self.0.wrapping_sub(wrap.mul(quotient).0))
    }
}

impl Add for Q16 {
    type Output = Q16;
    fn add(self, rhs: Q16) -> Q16 {
        Q16(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Q16 {
    fn add_assign(&mut self, rhs: Q16) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Q16 {
    type Output = Q16;
    fn sub(self, rhs: Q16) -> Q16 {
        Q16(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Q16 {
    fn sub_assign(&mut self, rhs: Q16) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl Neg for Q16 {
    type Output = Q16;
    fn neg(self) -> Q16 {
        Q16(self.0.wrapping_neg())
    }
}

impl fmt::Debug for Q16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q16({:.5})", self.to_f32())
    }
}

impl fmt::Display for Q16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_f32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_round_trip_is_close() {
        for &v in &[0.0f32, 1.0, -1.0, 5.25, -6.0, 0.001] {
            assert!((Q16::from_f32(v).to_f32() - v).abs() < 1.0 / 65536.0);
        }
    }

    #[test]
    fn mul_and_div() {
        let a = Q16::from_f32(1.5);
        let b = Q16::from_int(4);
        assert_eq!(a.mul(b), Q16::from_int(6));
        assert_eq!(Q16::from_int(6).div(b), a);
    }

    #[test]
    fn divide_by_zero_is_zero() {
        assert_eq!(Q16::ONE.div(Q16::ZERO), Q16::ZERO);
        assert_eq!(Q16::from_ratio(5, 0), Q16::ZERO);
    }

    #[test]
    fn floor_rounds_toward_negative_infinity() {
        assert_eq!(Q16::from_f32(2.75).floor(), Q16::from_int(2));
        assert_eq!(Q16::from_f32(-0.25).floor(), Q16::from_int(-1));
        assert_eq!(Q16::from_f32(-0.25).floor_int(), -1);
    }

    #[test]
    fn rem_floor_wraps_into_range() {
        let r = Q16::from_int(7).rem_floor(Q16::from_int(3));
        assert_eq!(r, Q16::from_int(1));
        let r = Q16::from_int(-1).rem_floor(Q16::from_int(3));
        assert_eq!(r, Q16::from_int(2));
        assert_eq!(Q16::from_int(5).rem_floor(Q16::ZERO), Q16::from_int(5));
    }

    #[test]
    fn ratio_is_exact_for_powers_of_two() {
        assert_eq!(Q16::from_ratio(1, 4), Q16(1 << 14));
        assert_eq!(Q16::from_ratio(32, 32), Q16::ONE);
    }
}
