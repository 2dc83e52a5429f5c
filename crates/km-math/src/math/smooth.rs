//! Gaussian smoothing on equally spaced grids.
//!
//! The kernel spans `±6σ` at the grid spacing and is normalized so its
//! weights sum to one (unit area at unit index spacing). Convolution is
//! `same`-mode, i.e. the output is aligned with the input. When the kernel
//! is longer than the signal, the signal is tiled an odd number of times
//! and the central copy is kept.

use std::ops::Range;

use crate::math::grid::{check_paired, uniform_spacing};
use crate::{MathError, Result};

/// Kernel half-width in units of sigma.
pub const KERNEL_HALF_WIDTH_SIGMAS: f64 = 6.0;

/// Mirror padding added at each end before smoothing, in units of sigma.
pub const MIRROR_PAD_SIGMAS: f64 = 10.0;

/// Sampled, normalized Gaussian kernel for grid spacing `dx`.
///
/// Taps sit on the grid points `k * dx` inside `[-6σ, 6σ]`, so the kernel
/// has odd length and is centred on the output sample. Fails with
/// `InvalidParameter` when `6σ <= dx` (the kernel would not resolve on the
/// grid).
pub fn gaussian_kernel(sigma: f64, dx: f64) -> Result<Vec<f64>> {
    if !(dx.is_finite() && dx > 0.0) {
        return Err(MathError::InvalidParameter {
            name: "dx",
            reason: format!("grid spacing must be positive and finite, got {dx}"),
        });
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(MathError::InvalidParameter {
            name: "sigma",
            reason: format!("smoothing scale must be positive and finite, got {sigma}"),
        });
    }
    let half = KERNEL_HALF_WIDTH_SIGMAS * sigma;
    if half <= dx {
        return Err(MathError::InvalidParameter {
            name: "sigma",
            reason: format!(
                "smoothing scale {sigma} is smaller than the discretization grid (6*sigma = {half} <= spacing {dx})"
            ),
        });
    }

    let taps = (half / dx).floor().max(1.0) as i64;
    let mut kernel: Vec<f64> = (-taps..=taps)
        .map(|k| {
            let g = dx * k as f64;
            (-0.5 * (g / sigma).powi(2)).exp()
        })
        .collect();
    let area: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= area;
    }
    Ok(kernel)
}

/// Number of signal copies needed so the central copy sees a full kernel
/// on both sides. Always odd, and at least `ceil(kernel_len / signal_len)`.
pub fn tile_count(kernel_len: usize, signal_len: usize) -> usize {
    if signal_len == 0 {
        return 1;
    }
    let mut reps = kernel_len.div_ceil(signal_len).max(1);
    if reps % 2 == 0 {
        reps += 1;
    }
    while (reps - 1) * signal_len < kernel_len.saturating_sub(1) {
        reps += 2;
    }
    reps
}

/// `same`-mode discrete convolution, zero outside the signal.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    convolve_same_range(signal, kernel, 0..signal.len())
}

/// `same`-mode convolution evaluated only at the output indices in `range`.
fn convolve_same_range(signal: &[f64], kernel: &[f64], range: Range<usize>) -> Vec<f64> {
    let n = signal.len() as isize;
    let offset = (kernel.len() as isize - 1) / 2;
    range
        .map(|i| {
            let centre = i as isize + offset;
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, w)| {
                    let idx = centre - j as isize;
                    (0..n).contains(&idx).then(|| w * signal[idx as usize])
                })
                .sum()
        })
        .collect()
}

/// Convolve, tiling the signal first when `tile` is set.
fn convolve_tiled(signal: &[f64], kernel: &[f64], tile: bool) -> Vec<f64> {
    if !tile || signal.is_empty() {
        return convolve_same(signal, kernel);
    }
    let len = signal.len();
    let reps = tile_count(kernel.len(), len);
    let tiled: Vec<f64> = signal.iter().copied().cycle().take(len * reps).collect();
    let start = len * (reps - 1) / 2;
    convolve_same_range(&tiled, kernel, start..start + len)
}

/// Gaussian smoothing of `y` sampled on the equally spaced grid `x`.
///
/// `sigma` is in the units of `x`. No boundary treatment beyond tiling
/// when the kernel outgrows the signal; see [`smooth_mirrored`] for the
/// reflective variant used by run analysis.
pub fn smooth_gaussian(x: &[f64], y: &[f64], sigma: f64) -> Result<Vec<f64>> {
    check_paired(x, y)?;
    let dx = uniform_spacing(x)?;
    let kernel = gaussian_kernel(sigma, dx)?;
    let tile = kernel.len() > y.len();
    Ok(convolve_tiled(y, &kernel, tile))
}

/// Number of samples mirrored at each end by [`smooth_mirrored`]:
/// `floor(min(10σ, span) / dx)`, never more than `len - 1`.
pub fn mirror_pad_len(len: usize, span: f64, dx: f64, sigma: f64) -> usize {
    if len < 2 || dx <= 0.0 {
        return 0;
    }
    let reach = (MIRROR_PAD_SIGMAS * sigma).min(span);
    ((reach / dx).floor().max(0.0) as usize).min(len - 1)
}

/// Gaussian smoothing with reflective boundaries.
///
/// The signal is extended at both ends by mirroring [`mirror_pad_len`]
/// samples (the end sample itself is not repeated), smoothed, and cropped
/// back to the original length. If the padded signal still cannot cover
/// half a kernel at the edges it is tiled as well.
pub fn smooth_mirrored(x: &[f64], y: &[f64], sigma: f64) -> Result<Vec<f64>> {
    check_paired(x, y)?;
    let n = y.len();
    let dx = uniform_spacing(x)?;
    if dx <= 0.0 {
        return Err(MathError::ZeroSpan);
    }
    let kernel = gaussian_kernel(sigma, dx)?;
    let span = x[n - 1] - x[0];
    let extra = mirror_pad_len(n, span, dx, sigma);

    let mut padded = Vec::with_capacity(n + 2 * extra);
    padded.extend(y[1..=extra].iter().rev());
    padded.extend_from_slice(y);
    padded.extend(y[n - 1 - extra..n - 1].iter().rev());

    let half = (kernel.len() - 1) / 2;
    let tile = kernel.len() > padded.len() || half > extra;
    let smoothed = convolve_tiled(&padded, &kernel, tile);
    Ok(smoothed[extra..extra + n].to_vec())
}
