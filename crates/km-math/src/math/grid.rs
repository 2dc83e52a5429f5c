//! Paired series, equally spaced grids and linear resampling.

use serde::{Deserialize, Serialize};

use crate::{MathError, Result};

/// A paired `(x, y)` series with equal lengths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Series {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        check_paired(&x, &y)?;
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Copy of the points whose index lies in `range`.
    pub fn slice(&self, range: std::ops::RangeInclusive<usize>) -> Series {
        Series {
            x: self.x[range.clone()].to_vec(),
            y: self.y[range].to_vec(),
        }
    }

    /// Shift every abscissa by `-origin`.
    pub fn shifted(mut self, origin: f64) -> Series {
        for v in &mut self.x {
            *v -= origin;
        }
        self
    }
}

/// `n` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Mean spacing of `x`: `(max - min) / (len - 1)`.
pub fn uniform_spacing(x: &[f64]) -> Result<f64> {
    if x.len() < 2 {
        return Err(MathError::InsufficientData {
            needed: 2,
            got: x.len(),
        });
    }
    let min = x.iter().copied().fold(f64::INFINITY, f64::min);
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((max - min) / (x.len() - 1) as f64)
}

pub(crate) fn check_paired(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(MathError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    Ok(())
}

/// Piecewise-linear interpolant over a non-decreasing abscissa.
///
/// Where the abscissa repeats, the later point wins. Queries outside the
/// data range clamp to the end values.
#[derive(Debug, Clone, Copy)]
pub struct LinearInterpolator<'a> {
    x: &'a [f64],
    y: &'a [f64],
}

impl<'a> LinearInterpolator<'a> {
    pub fn new(x: &'a [f64], y: &'a [f64]) -> Result<Self> {
        check_paired(x, y)?;
        if x.is_empty() {
            return Err(MathError::InsufficientData { needed: 1, got: 0 });
        }
        if let Some(i) = x.windows(2).position(|w| w[1] < w[0]) {
            return Err(MathError::NonMonotonic(i + 1));
        }
        Ok(Self { x, y })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        // First index strictly past t; the segment is [upper - 1, upper].
        let upper = self.x.partition_point(|v| *v <= t);
        if upper == 0 {
            return self.y[0];
        }
        if upper == n {
            return self.y[n - 1];
        }
        let (x0, x1) = (self.x[upper - 1], self.x[upper]);
        let (y0, y1) = (self.y[upper - 1], self.y[upper]);
        y0 + (y1 - y0) * (t - x0) / (x1 - x0)
    }
}

/// Resample `(x, y)` onto an equally spaced grid with the same number of
/// points, spanning `x[0]..=x[last]`.
pub fn resample_uniform(x: &[f64], y: &[f64]) -> Result<Series> {
    let interp = LinearInterpolator::new(x, y)?;
    let n = x.len();
    if n < 2 {
        return Err(MathError::InsufficientData { needed: 2, got: n });
    }
    if x[n - 1] <= x[0] {
        return Err(MathError::ZeroSpan);
    }
    let grid = linspace(x[0], x[n - 1], n);
    let values = grid.iter().map(|&t| interp.eval(t)).collect();
    Ok(Series { x: grid, y: values })
}
