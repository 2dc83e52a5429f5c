//! Finite differences and quadrature.

use crate::math::grid::{check_paired, Series};
use crate::{MathError, Result};

/// First derivative by forward differences, reported at interval midpoints.
///
/// Output point `i` sits at `(x[i] + x[i+1]) / 2` with value
/// `(y[i+1] - y[i]) / (x[i+1] - x[i])`, so the result has `len - 1` points.
pub fn midpoint_derivative(x: &[f64], y: &[f64]) -> Result<Series> {
    check_paired(x, y)?;
    if x.len() < 2 {
        return Err(MathError::InsufficientData {
            needed: 2,
            got: x.len(),
        });
    }
    let mut mid = Vec::with_capacity(x.len() - 1);
    let mut slope = Vec::with_capacity(x.len() - 1);
    for i in 0..x.len() - 1 {
        let dx = x[i + 1] - x[i];
        if dx <= 0.0 {
            return Err(MathError::NonMonotonic(i + 1));
        }
        mid.push(0.5 * (x[i] + x[i + 1]));
        slope.push((y[i + 1] - y[i]) / dx);
    }
    Ok(Series { x: mid, y: slope })
}

/// Trapezoidal integral of `y` over `x`. Zero for fewer than two points.
pub fn trapezoid(x: &[f64], y: &[f64]) -> Result<f64> {
    check_paired(x, y)?;
    Ok(x
        .windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * 0.5 * (ys[0] + ys[1]))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn derivative_of_ramp_is_slope() {
        let x = [0.0, 0.5, 1.0, 2.0];
        let y: Vec<f64> = x.iter().map(|t| 3.0 * t - 1.0).collect();
        let d = midpoint_derivative(&x, &y).unwrap();
        assert_eq!(d.x, vec![0.25, 0.75, 1.5]);
        for v in d.y {
            assert!(approx_eq(v, 3.0, 1e-12));
        }
    }

    #[test]
    fn derivative_rejects_repeated_abscissa() {
        let x = [0.0, 1.0, 1.0];
        let y = [0.0, 1.0, 2.0];
        assert_eq!(
            midpoint_derivative(&x, &y).unwrap_err(),
            MathError::NonMonotonic(2)
        );
    }

    #[test]
    fn trapezoid_of_step_indicator() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0];
        assert!(approx_eq(trapezoid(&x, &y).unwrap(), 4.0, 1e-12));
    }

    #[test]
    fn trapezoid_degenerate_inputs() {
        assert_eq!(trapezoid(&[1.0], &[5.0]).unwrap(), 0.0);
        assert_eq!(trapezoid(&[], &[]).unwrap(), 0.0);
        assert!(trapezoid(&[0.0, 1.0], &[1.0]).is_err());
    }
}
