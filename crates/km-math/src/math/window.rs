//! Index windows selected by thresholds or time bounds.

use std::ops::RangeInclusive;

/// Smallest index range containing every value that satisfies `pred`.
///
/// Returns `None` when no value qualifies. Values inside the range that do
/// not satisfy `pred` are kept, so the range is contiguous.
pub fn contiguous_range<F>(values: &[f64], pred: F) -> Option<RangeInclusive<usize>>
where
    F: Fn(f64) -> bool,
{
    let first = values.iter().position(|v| pred(*v))?;
    let last = values.iter().rposition(|v| pred(*v))?;
    Some(first..=last)
}

/// Indices of a sorted abscissa that fall inside `[lo - tol, hi + tol]`.
pub fn indices_within(x: &[f64], lo: f64, hi: f64, tol: f64) -> Option<RangeInclusive<usize>> {
    let start = x.partition_point(|v| *v < lo - tol);
    let end = x.partition_point(|v| *v <= hi + tol);
    (start < end).then(|| start..=end - 1)
}

/// Index of the abscissa value closest to `t` in a sorted slice.
pub fn nearest_index(x: &[f64], t: f64) -> Option<usize> {
    if x.is_empty() {
        return None;
    }
    let upper = x.partition_point(|v| *v < t);
    if upper == 0 {
        return Some(0);
    }
    if upper == x.len() {
        return Some(x.len() - 1);
    }
    if (x[upper] - t) < (t - x[upper - 1]) {
        Some(upper)
    } else {
        Some(upper - 1)
    }
}

/// Largest finite value, ignoring NaN.
pub fn max_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).reduce(f64::max)
}

/// Smallest finite value, ignoring NaN.
pub fn min_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).reduce(f64::min)
}
