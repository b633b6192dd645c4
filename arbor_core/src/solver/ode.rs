//! Closed-form solutions of `a·y'' + b·y' + c·y = g`
//!
//! The characteristic polynomial `a·r² + b·r + c` is classified into one of
//! three regimes and the homogeneous solution is fitted to the initial
//! conditions after removing the constant particular solution `g / c`.

use nalgebra::Vector3;

/// Roots of `a·r² + b·r + c = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadraticRoots {
    /// Double real root
    Repeated(f32),
    /// Two distinct real roots
    Distinct(f32, f32),
    /// Complex-conjugate pair `re ± i·im`
    Complex { re: f32, im: f32 },
}

/// Discriminants this close to zero (relative to the coefficients) are
/// treated as a double root. Fitting constants with `1 / (r1 - r2)` is
/// unstable otherwise.
const REPEATED_ROOT_TOLERANCE: f32 = 8.0 * f32::EPSILON;

pub fn solve_quadratic(a: f32, b: f32, c: f32) -> QuadraticRoots {
    let discriminant = b * b - 4.0 * a * c;
    let scale = (b * b).max((4.0 * a * c).abs());

    if discriminant.abs() <= REPEATED_ROOT_TOLERANCE * scale {
        QuadraticRoots::Repeated(-b / (2.0 * a))
    } else if discriminant > 0.0 {
        // Avoid cancellation between -b and the square root.
        let q = -0.5 * (b + b.signum() * discriminant.sqrt());
        let q = if q == 0.0 { -0.5 * discriminant.sqrt() } else { q };
        QuadraticRoots::Distinct(q / a, c / q)
    } else {
        QuadraticRoots::Complex {
            re: -b / (2.0 * a),
            im: (-discriminant).sqrt() / (2.0 * a),
        }
    }
}

/// A solution fitted to `(y(0), y'(0))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DifferentialSolution {
    /// `y = (c1 + c2·t)·e^(r·t) + k`
    Repeated { c1: f32, c2: f32, r: f32, k: f32 },
    /// `y = c1·e^(r1·t) + c2·e^(r2·t) + k`
    Distinct {
        c1: f32,
        c2: f32,
        r1: f32,
        r2: f32,
        k: f32,
    },
    /// `y = e^(λ·t)·(c1·cos(μ·t) + c2·sin(μ·t)) + k`
    Complex {
        c1: f32,
        c2: f32,
        lambda: f32,
        mu: f32,
        k: f32,
    },
}

/// Solve `a·y'' + b·y' + c·y = g` with `y(0) = y0`, `y'(0) = dy0`.
///
/// `a` and `c` must be non-zero.
pub fn solve_differential(
    a: f32,
    b: f32,
    c: f32,
    g: f32,
    y0: f32,
    dy0: f32,
) -> DifferentialSolution {
    debug_assert!(a != 0.0 && c != 0.0);

    let k = g / c;
    let h0 = y0 - k;

    match solve_quadratic(a, b, c) {
        QuadraticRoots::Repeated(r) => DifferentialSolution::Repeated {
            c1: h0,
            c2: dy0 - r * h0,
            r,
            k,
        },
        QuadraticRoots::Distinct(r1, r2) => {
            let c1 = (dy0 - r2 * h0) / (r1 - r2);
            DifferentialSolution::Distinct {
                c1,
                c2: h0 - c1,
                r1,
                r2,
                k,
            }
        }
        QuadraticRoots::Complex { re, im } => DifferentialSolution::Complex {
            c1: h0,
            c2: (dy0 - re * h0) / im,
            lambda: re,
            mu: im,
            k,
        },
    }
}

impl DifferentialSolution {
    /// Returns `(y(t), y'(t), y''(t))`
    pub fn evaluate(&self, t: f32) -> Vector3<f32> {
        match *self {
            Self::Repeated { c1, c2, r, k } => {
                let e = (r * t).exp();
                Vector3::new(
                    (c1 + c2 * t) * e + k,
                    (r * c1 + c2 + r * c2 * t) * e,
                    (r * r * c1 + 2.0 * r * c2 + r * r * c2 * t) * e,
                )
            }
            Self::Distinct { c1, c2, r1, r2, k } => {
                let e1 = (r1 * t).exp();
                let e2 = (r2 * t).exp();
                Vector3::new(
                    c1 * e1 + c2 * e2 + k,
                    r1 * c1 * e1 + r2 * c2 * e2,
                    r1 * r1 * c1 * e1 + r2 * r2 * c2 * e2,
                )
            }
            Self::Complex {
                c1,
                c2,
                lambda,
                mu,
                k,
            } => {
                let e = (lambda * t).exp();
                let (sin, cos) = (mu * t).sin_cos();
                let l2_m2 = lambda * lambda - mu * mu;
                let two_lm = 2.0 * lambda * mu;
                Vector3::new(
                    e * (c1 * cos + c2 * sin) + k,
                    e * ((lambda * c1 + mu * c2) * cos + (lambda * c2 - mu * c1) * sin),
                    e * ((l2_m2 * c1 + two_lm * c2) * cos + (l2_m2 * c2 - two_lm * c1) * sin),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quadratic_distinct() {
        match solve_quadratic(1.0, 11.0, 24.0) {
            QuadraticRoots::Distinct(r1, r2) => {
                assert_relative_eq!(r1, -8.0, epsilon = 1e-5);
                assert_relative_eq!(r2, -3.0, epsilon = 1e-5);
            }
            other => panic!("expected distinct roots, got {:?}", other),
        }
    }

    #[test]
    fn test_quadratic_repeated() {
        assert_eq!(solve_quadratic(1.0, -4.0, 4.0), QuadraticRoots::Repeated(2.0));
    }

    #[test]
    fn test_quadratic_complex() {
        match solve_quadratic(1.0, -4.0, 9.0) {
            QuadraticRoots::Complex { re, im } => {
                assert_relative_eq!(re, 2.0, epsilon = 1e-6);
                assert_relative_eq!(im, 5.0f32.sqrt(), epsilon = 1e-6);
            }
            other => panic!("expected complex roots, got {:?}", other),
        }
    }

    #[test]
    fn test_distinct_constants() {
        let solution = solve_differential(1.0, 11.0, 24.0, 0.0, 0.0, -7.0);
        let y = solution.evaluate(0.0);
        assert_relative_eq!(y.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y.y, -7.0, epsilon = 1e-5);
        assert_relative_eq!(y.z, 77.0, epsilon = 1e-4);
    }

    #[test]
    fn test_repeated_constants() {
        let solution = solve_differential(1.0, -4.0, 4.0, 0.0, 12.0, -3.0);
        assert_eq!(
            solution,
            DifferentialSolution::Repeated {
                c1: 12.0,
                c2: -27.0,
                r: 2.0,
                k: 0.0
            }
        );
        let y = solution.evaluate(0.0);
        assert_relative_eq!(y, Vector3::new(12.0, -3.0, -60.0), epsilon = 1e-5);
    }

    #[test]
    fn test_complex_constants() {
        let solution = solve_differential(1.0, -4.0, 9.0, 0.0, 0.0, -8.0);
        let y = solution.evaluate(0.0);
        assert_relative_eq!(y, Vector3::new(0.0, -8.0, -32.0), epsilon = 1e-4);
    }

    #[test]
    fn test_forcing_term_keeps_initial_conditions() {
        for (a, b, c) in [(1.0, 11.0, 24.0), (1.0, 4.0, 4.0), (2.0, 1.0, 9.0)] {
            let y = solve_differential(a, b, c, 3.0, 0.25, -1.5).evaluate(0.0);
            assert_relative_eq!(y.x, 0.25, epsilon = 1e-5);
            assert_relative_eq!(y.y, -1.5, epsilon = 1e-5);
            // y'' follows from the equation itself
            assert_relative_eq!(y.z, (3.0 - b * y.y - c * y.x) / a, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_nearly_critical_damping_is_repeated() {
        let b = 2.0 * 3.0f32.sqrt();
        assert!(matches!(
            solve_quadratic(1.0, b, 3.0),
            QuadraticRoots::Repeated(_)
        ));
    }
}
