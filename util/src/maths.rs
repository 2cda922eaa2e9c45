//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a value into the closed range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Clamp a value into the symmetric range `[-limit, limit]`.
pub fn clamp_sym<T>(value: T, limit: T) -> T
where
    T: Float,
{
    clamp(value, -limit.abs(), limit.abs())
}

/// Normalise an angle in degrees into the range (-180, 180].
///
/// Every angle has exactly one representative in this range, so
/// `normalise_angle_deg(720.0) == normalise_angle_deg(0.0)`.
pub fn normalise_angle_deg<T>(angle_deg: T) -> T
where
    T: Float,
{
    let full: T = T::from(360.0).unwrap_or_else(T::zero);
    let half: T = T::from(180.0).unwrap_or_else(T::zero);

    let r = wrap_360_deg(angle_deg);

    if r > half {
        r - full
    } else {
        r
    }
}

/// Wrap an angle in degrees into the range [0, 360).
pub fn wrap_360_deg<T>(angle_deg: T) -> T
where
    T: Float,
{
    let full: T = T::from(360.0).unwrap_or_else(T::zero);

    let r = rem_euclid(angle_deg, full);

    // Round-off in rem_euclid can land exactly on the modulus
    if r >= full {
        r - full
    } else {
        r
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(2.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-2.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.3, -1.0, 1.0), 0.3);
        assert_eq!(clamp_sym(0.7, 0.5), 0.5);
        assert_eq!(clamp_sym(-0.7, -0.5), -0.5);
    }

    #[test]
    fn test_normalise_angle_deg() {
        assert_eq!(normalise_angle_deg(0.0), 0.0);
        assert_eq!(normalise_angle_deg(720.0), normalise_angle_deg(0.0));
        assert_eq!(normalise_angle_deg(190.0), -170.0);
        assert_eq!(normalise_angle_deg(-190.0), 170.0);
        assert_eq!(normalise_angle_deg(180.0), 180.0);
        assert_eq!(normalise_angle_deg(-180.0), 180.0);
        assert_eq!(normalise_angle_deg(-90.0), -90.0);

        // Idempotent and always within range
        let mut a = -1000.0;
        while a < 1000.0 {
            let n = normalise_angle_deg(a);
            assert!(n > -180.0 && n <= 180.0, "{} -> {}", a, n);
            assert_eq!(normalise_angle_deg(n), n);
            a += 7.3;
        }
    }

    #[test]
    fn test_wrap_360_deg() {
        assert_eq!(wrap_360_deg(360.0), 0.0);
        assert_eq!(wrap_360_deg(-90.0), 270.0);
        assert!(wrap_360_deg(-1e-14) < 360.0);
    }
}
