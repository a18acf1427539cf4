//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a value into the range `[min, max]`.
///
/// NaN inputs are returned unchanged, callers must check finiteness where it
/// matters.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

/// Apply polynomial coefficients to a value.
///
/// Coefficients are ordered highest power first, so `[a, b, c]` evaluates
/// `a*x^2 + b*x + c`.
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float,
{
    coeffs.iter().fold(T::zero(), |acc, &c| acc * value + c)
}

/// Limit the change from `prev` to `next` to at most `max_delta` in either
/// direction.
pub fn rate_limit<T>(prev: T, next: T, max_delta: T) -> T
where
    T: Float,
{
    let max_delta = max_delta.abs();
    clamp(next, prev - max_delta, prev + max_delta)
}

/// Solve `a*x^2 + b*x + c = 0`, returning the real root nearest zero.
///
/// Degenerates to the linear solution when `a` is zero. Returns `None` if
/// there is no real root.
pub fn quadratic_root<T>(a: T, b: T, c: T) -> Option<T>
where
    T: Float,
{
    if a == T::zero() {
        if b == T::zero() {
            return None;
        }
        return Some(-c / b);
    }

    let two = T::one() + T::one();
    let four = two + two;
    let disc = b * b - four * a * c;

    if disc < T::zero() {
        return None;
    }

    let sq = disc.sqrt();
    let r0 = (-b + sq) / (two * a);
    let r1 = (-b - sq) / (two * a);

    if r0.abs() <= r1.abs() {
        Some(r0)
    } else {
        Some(r1)
    }
}
