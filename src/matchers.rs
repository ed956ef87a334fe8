//! Value matchers for `expect!`.
//!
//! Each matcher is an ordinary predicate function; the macro layer handles
//! capturing the expression text and reporting the received value when one
//! comes back false.

use std::ops::{Add, Sub};

/// Tolerance used by [`be_about`] for float comparison.
pub const ABOUT_EPSILON: f32 = 0.0001;

pub fn be_true(value: bool) -> bool {
    value
}

pub fn be_false(value: bool) -> bool {
    !value
}

pub fn be_positive<T: PartialOrd + Default>(value: T) -> bool {
    value > T::default()
}

pub fn be_negative<T: PartialOrd + Default>(value: T) -> bool {
    value < T::default()
}

pub fn be_even<T: Into<i64>>(value: T) -> bool {
    value.into() % 2 == 0
}

pub fn be_odd<T: Into<i64>>(value: T) -> bool {
    value.into() % 2 != 0
}

/// Inclusive on both ends.
pub fn be_between<T: PartialOrd>(value: T, low: T, high: T) -> bool {
    low <= value && value <= high
}

pub fn be_between_exclusive<T: PartialOrd>(value: T, low: T, high: T) -> bool {
    low < value && value < high
}

/// Within `margin` of `target`, inclusive.
pub fn be_within<T>(value: T, margin: T, target: T) -> bool
where
    T: PartialOrd + Add<Output = T> + Sub<Output = T> + Copy,
{
    target - margin <= value && value <= target + margin
}

/// Approximate float equality, for values that came out of arithmetic.
pub fn be_about(value: f32, target: f32) -> bool {
    (value - target).abs() <= ABOUT_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_is_inclusive_and_exclusive_is_not() {
        assert!(be_between(1, 1, 5));
        assert!(be_between(5, 1, 5));
        assert!(!be_between_exclusive(1, 1, 5));
        assert!(!be_between_exclusive(5, 1, 5));
        assert!(be_between_exclusive(3, 1, 5));
    }

    #[test]
    fn within_straddles_the_target() {
        assert!(be_within(3, 2, 5));
        assert!(be_within(7, 2, 5));
        assert!(!be_within(8, 2, 5));
    }

    #[test]
    fn about_tolerates_float_noise() {
        let third = 1.0f32 / 3.0;
        assert!(third != 0.3333);
        assert!(be_about(third, 0.3333));
        assert!(!be_about(0.34, 0.3333));
    }

    #[test]
    fn parity_and_sign() {
        assert!(be_even(4));
        assert!(be_odd(-3));
        assert!(be_positive(0.5));
        assert!(be_negative(-2));
        assert!(!be_positive(0));
    }
}
