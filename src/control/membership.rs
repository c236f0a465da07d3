//! Fuzzy membership functions. Each takes the evaluated value `x`, the
//! centre `a` and the half-width `b`, and returns a degree in `0.0..=1.0`.

/// Triangle: 1 at `a`, falling linearly to 0 at `a ± b`.
pub fn triangle(x: f64, a: f64, b: f64) -> f64 {
    if x <= a - b || x >= a + b {
        0.0
    } else {
        1.0 - (x - a).abs() / b
    }
}

/// Ramp from 0 at `a - b` up to 1 at `a`, then 1 for everything above.
pub fn plateau(x: f64, a: f64, b: f64) -> f64 {
    if x <= a - b {
        0.0
    } else if x >= a {
        1.0
    } else {
        1.0 - (x - a).abs() / b
    }
}

/// Sharp peak at `a` with a long tail: `b / (|x - a| + b)`.
pub fn asymptotic(x: f64, a: f64, b: f64) -> f64 {
    b / ((x - a).abs() + b)
}

/// Flat top of 1 within `a ± b`, decaying as `b / |x - a|` outside.
pub fn trapezoid(x: f64, a: f64, b: f64) -> f64 {
    if x >= a - b && x <= a + b {
        1.0
    } else {
        b / (x - a).abs()
    }
}

/// Widen a tolerance `a` at high speed excess `x` with coefficient `b`:
/// `b·x²` once that exceeds `a`, never below `a`.
pub fn widen(x: f64, a: f64, b: f64) -> f64 {
    if b <= 0.0 || x <= (a / b).sqrt() {
        a
    } else {
        b * x * x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_is_zero_outside_the_base() {
        assert_eq!(triangle(5.0, 5.0, 2.0), 1.0);
        assert_eq!(triangle(6.0, 5.0, 2.0), 0.5);
        assert_eq!(triangle(7.0, 5.0, 2.0), 0.0);
        assert_eq!(triangle(-100.0, 5.0, 2.0), 0.0);
    }

    #[test]
    fn plateau_stays_at_one_above_centre() {
        assert_eq!(plateau(2.0, 5.0, 2.0), 0.0);
        assert_eq!(plateau(4.0, 5.0, 2.0), 0.5);
        assert_eq!(plateau(500.0, 5.0, 2.0), 1.0);
        assert_eq!(plateau(f64::INFINITY, 5.0, 2.0), 1.0);
    }

    #[test]
    fn plateau_with_zero_width_is_a_step() {
        assert_eq!(plateau(0.9, 1.0, 0.0), 0.0);
        assert_eq!(plateau(1.1, 1.0, 0.0), 1.0);
    }

    #[test]
    fn asymptotic_peaks_at_centre() {
        assert_eq!(asymptotic(10.0, 10.0, 5.0), 1.0);
        assert_eq!(asymptotic(15.0, 10.0, 5.0), 0.5);
        assert_eq!(asymptotic(f64::INFINITY, 10.0, 5.0), 0.0);
    }

    #[test]
    fn trapezoid_decays_outside_band() {
        assert_eq!(trapezoid(12.0, 10.0, 5.0), 1.0);
        assert_eq!(trapezoid(20.0, 10.0, 5.0), 0.5);
        assert_eq!(trapezoid(0.0, 10.0, 5.0), 0.5);
    }

    #[test]
    fn widen_keeps_floor_until_quadratic_overtakes() {
        assert_eq!(widen(100.0, 5.0, 0.0), 5.0);
        assert_eq!(widen(10.0, 5.0, 0.01), 5.0);
        assert!((widen(40.0, 5.0, 0.01) - 16.0).abs() < 1e-12);
    }
}
