// src/fmath.rs

/*
 * Fast approximate math helpers shared by the color model and the feature
 * engine. These trade bounded relative error for speed and must not be
 * assumed bit-exact against libm.
 */

use std::f32::consts::PI;

/// Fast arctangent approximation for |x| <= 1, max error ~0.005 rad.
/// Uses the reciprocal-free polynomial atan(x) ~= pi/4*x + 0.273*x*(1 - |x|).
#[inline]
fn atanf_unit(x: f32) -> f32 {
    (PI / 4.0) * x + 0.273 * x * (1.0 - x.abs())
}

/// Fast two-argument arctangent. Returns an angle in (-pi, pi].
///
/// Arguments outside the unit interval are folded through the reciprocal
/// identity atan(x) = pi/2 - atan(1/x) before the polynomial is applied.
pub fn fast_atan2f(y: f32, x: f32) -> f32 {
    if x == 0.0 && y == 0.0 {
        return 0.0;
    }
    let abs_y = y.abs();
    let abs_x = x.abs();
    // Core angle in [0, pi/2) from the octant-reduced ratio.
    let a = if abs_x >= abs_y {
        atanf_unit(abs_y / abs_x)
    } else {
        PI / 2.0 - atanf_unit(abs_x / abs_y)
    };
    let a = if x < 0.0 { PI - a } else { a };
    if y < 0.0 {
        -a
    } else {
        a
    }
}

/// Fast exponential via IEEE-754 bit manipulation (Schraudolph's method).
/// Relative error is below ~4% over the range used by the Gaussian weights.
pub fn fast_expf(x: f32) -> f32 {
    // Exponent underflows to garbage bits below roughly -87; the true
    // result is indistinguishable from zero there anyway.
    if x < -80.0 {
        return 0.0;
    }
    // 12102203 = 2^23 / ln(2); the additive constant folds in the IEEE
    // exponent bias minus Schraudolph's mean-error correction.
    let i = (12102203.0f32 * x) as i32 + 1064866805;
    f32::from_bits(i as u32)
}

/// Fast cube root for non-negative inputs: exponent-shift seed plus two
/// Newton refinements, accurate to ~1e-6 relative over (0, 1].
pub fn fast_cbrtf(x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    let i = x.to_bits() / 3 + 709_921_077;
    let mut y = f32::from_bits(i);
    // Newton: y <- (2y + x/y^2) / 3
    y = (2.0 * y + x / (y * y)) * (1.0 / 3.0);
    y = (2.0 * y + x / (y * y)) * (1.0 / 3.0);
    y
}

/// Round-half-away-from-zero to the nearest integer, as the hardware
/// float-to-int conversion on the target does.
#[inline]
pub fn fast_roundf(x: f32) -> i32 {
    if x >= 0.0 {
        (x + 0.5) as i32
    } else {
        (x - 0.5) as i32
    }
}

/// Floor to the next integer towards negative infinity.
#[inline]
pub fn fast_floorf(x: f32) -> i32 {
    let t = x as i32;
    if x < 0.0 && (t as f32) != x {
        t - 1
    } else {
        t
    }
}

/// Digit-by-digit binary integer square root.
/// Exact for every u32 input; the result fits 16 bits.
pub fn isqrt(mut x: u32) -> u16 {
    let mut res: u32 = 0;
    let mut bit: u32 = 1 << 30;

    while bit > x {
        bit >>= 2;
    }
    while bit != 0 {
        if x >= res + bit {
            x -= res + bit;
            res = (res >> 1) + bit;
        } else {
            res >>= 1;
        }
        bit >>= 2;
    }
    res as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isqrt_exact() {
        for v in [0u32, 1, 2, 3, 4, 15, 16, 17, 255, 65535, 65536, 1 << 30, u32::MAX] {
            let r = isqrt(v) as u64;
            assert!(r * r <= v as u64, "isqrt({v}) = {r} overshoots");
            assert!((r + 1) * (r + 1) > v as u64, "isqrt({v}) = {r} undershoots");
        }
    }

    #[test]
    fn test_atan2_quadrants() {
        let cases = [
            (0.0f32, 1.0f32, 0.0f32),
            (1.0, 0.0, PI / 2.0),
            (0.0, -1.0, PI),
            (-1.0, 0.0, -PI / 2.0),
            (1.0, 1.0, PI / 4.0),
        ];
        for (y, x, expected) in cases {
            let got = fast_atan2f(y, x);
            assert!(
                (got - expected).abs() < 0.01,
                "atan2({y}, {x}) = {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_expf_relative_error() {
        for i in -40..=4 {
            let x = i as f32 * 0.5;
            let exact = x.exp();
            let approx = fast_expf(x);
            if exact > 1e-12 {
                let rel = ((approx - exact) / exact).abs();
                assert!(rel < 0.05, "exp({x}): rel error {rel}");
            }
        }
        assert_eq!(fast_expf(-100.0), 0.0);
    }

    #[test]
    fn test_cbrt_accuracy() {
        for i in 1..=1000 {
            let x = i as f32 / 1000.0;
            let exact = x.cbrt();
            let approx = fast_cbrtf(x);
            assert!(
                ((approx - exact) / exact).abs() < 1e-4,
                "cbrt({x}): {approx} vs {exact}"
            );
        }
        assert_eq!(fast_cbrtf(0.0), 0.0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(fast_roundf(1.4), 1);
        assert_eq!(fast_roundf(1.5), 2);
        assert_eq!(fast_roundf(-1.5), -2);
        assert_eq!(fast_floorf(1.9), 1);
        assert_eq!(fast_floorf(-1.1), -2);
        assert_eq!(fast_floorf(-2.0), -2);
    }
}
