//! End-of-run analysis.
//!
//! Pipeline over a finished sample log:
//!
//! 1. `(runtime, temperature)` pairs, time re-based to hours from the first sample
//! 2. linear resampling onto an equally spaced grid of the same size
//! 3. mirror-padded Gaussian smoothing of the resampled temperature
//! 4. midpoint derivative of the smoothed series
//! 5. fire window: samples above the unload temperature, re-zeroed
//! 6. peaks, time above unload, and an optional peak-zoom window
//!
//! The engine holds only its settings, so the same input always yields the
//! same [`Report`].

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::debug;

use km_common::{AnalysisSettings, StateSample};
use km_math::{
    contiguous_range, indices_within, max_value, midpoint_derivative, min_value, nearest_index,
    resample_uniform, smooth_mirrored, trapezoid, Series,
};
use km_record::RunRecord;

use crate::{ReportError, Result};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Relative tolerance used when matching grid points to window bounds.
const WINDOW_TOLERANCE: f64 = 1e-9;

/// Time/temperature/derivative arrays for one plotted window.
///
/// `raw` is on the recorded time axis; `smoothed` and `derivative` are on the
/// resampled grid (the derivative at its midpoints). Times are hours from
/// the start of the fire window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSeries {
    pub raw: Series,
    pub smoothed: Series,
    pub derivative: Series,
}

impl DerivedSeries {
    /// Time range covered by the raw series.
    pub fn time_span(&self) -> (f64, f64) {
        match (self.raw.x.first(), self.raw.x.last()) {
            (Some(a), Some(b)) => (*a, *b),
            _ => (0.0, 0.0),
        }
    }
}

/// Result of analyzing one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Highest recorded temperature in the fire window.
    pub max_temperature_raw: f64,
    /// Highest smoothed temperature in the fire window.
    pub max_temperature_smoothed: f64,
    /// Hours spent above the unload temperature.
    pub fire_duration_hours: f64,
    /// Settings the report was computed with.
    pub settings: AnalysisSettings,
    /// Fire window series.
    pub full_series: DerivedSeries,
    /// Peak-zoom window, present only when narrower than the fire window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_window_series: Option<DerivedSeries>,
}

impl Report {
    /// Pretty JSON, stable across calls for the same report.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Pure transform from a sample log to a [`Report`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisEngine {
    settings: AnalysisSettings,
}

impl AnalysisEngine {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Analyze a persisted record with the settings stored in it.
    pub fn analyze_record(record: &RunRecord) -> Result<Report> {
        Self::new(record.analysis_settings).analyze(&record.samples)
    }

    /// Analyze an ordered sample log.
    pub fn analyze(&self, samples: &[StateSample]) -> Result<Report> {
        let first = samples.first().ok_or(ReportError::EmptyRun)?;
        let origin = first.runtime;
        let raw = Series {
            x: samples
                .iter()
                .map(|s| (s.runtime - origin) / SECONDS_PER_HOUR)
                .collect(),
            y: samples.iter().map(|s| s.temperature).collect(),
        };

        let equi = resample_uniform(&raw.x, &raw.y)?;
        let smoothed = Series {
            y: smooth_mirrored(&equi.x, &equi.y, self.settings.smoothing_scale)?,
            x: equi.x,
        };
        let derivative = midpoint_derivative(&smoothed.x, &smoothed.y)?;

        let unload = self.settings.unload_temperature;
        let window = contiguous_range(&raw.y, |t| t > unload).unwrap_or(0..=raw.len() - 1);
        let indicator: Vec<f64> = raw
            .y
            .iter()
            .map(|t| if *t > unload { 1.0 } else { 0.0 })
            .collect();
        let fire_duration_hours = trapezoid(&raw.x, &indicator)?;

        let window_start = raw.x[*window.start()];
        let window_end = raw.x[*window.end()];
        let full_series = DerivedSeries {
            raw: raw.slice(window.clone()),
            smoothed: trim_to(&smoothed, window_start, window_end),
            derivative: trim_to(&derivative, window_start, window_end),
        };
        let full_series = rezero(full_series, window_start);

        let max_temperature_raw = max_value(&full_series.raw.y).ok_or(ReportError::EmptyRun)?;
        let max_temperature_smoothed =
            max_value(&full_series.smoothed.y).ok_or(ReportError::EmptyRun)?;

        let peak_window_series = self.peak_window(&full_series, max_temperature_raw);

        debug!(
            samples = samples.len(),
            window_start = *window.start(),
            window_end = *window.end(),
            max_raw = max_temperature_raw,
            max_smoothed = max_temperature_smoothed,
            fire_hours = fire_duration_hours,
            peak_window = peak_window_series.is_some(),
            "run analyzed"
        );

        Ok(Report {
            max_temperature_raw,
            max_temperature_smoothed,
            fire_duration_hours,
            settings: self.settings,
            full_series,
            peak_window_series,
        })
    }

    /// Points within `peak_zoom` of the maximum, if that is a strict subset.
    ///
    /// The bound is inclusive: the threshold is clamped to the series
    /// minimum, and a strict bound there would drop the coolest points.
    fn peak_window(&self, full: &DerivedSeries, max_raw: f64) -> Option<DerivedSeries> {
        let floor = min_value(&full.raw.y)?;
        let threshold = (max_raw - self.settings.peak_zoom).max(floor);
        let range = contiguous_range(&full.raw.y, |t| t >= threshold)?;
        if range == (0..=full.raw.len() - 1) {
            return None;
        }
        let (lo, hi) = (full.raw.x[*range.start()], full.raw.x[*range.end()]);
        Some(DerivedSeries {
            raw: full.raw.slice(range),
            smoothed: trim_to(&full.smoothed, lo, hi),
            derivative: trim_to(&full.derivative, lo, hi),
        })
    }
}

/// Points of `series` inside `[lo, hi]`; the nearest point when none falls inside.
fn trim_to(series: &Series, lo: f64, hi: f64) -> Series {
    let span = series
        .x
        .last()
        .zip(series.x.first())
        .map(|(b, a)| (b - a).abs())
        .unwrap_or(0.0);
    let tol = WINDOW_TOLERANCE * span.max(1.0);
    let range: Option<RangeInclusive<usize>> = indices_within(&series.x, lo, hi, tol)
        .or_else(|| nearest_index(&series.x, 0.5 * (lo + hi)).map(|i| i..=i));
    match range {
        Some(r) => series.slice(r),
        None => Series::default(),
    }
}

fn rezero(series: DerivedSeries, origin: f64) -> DerivedSeries {
    DerivedSeries {
        raw: series.raw.shifted(origin),
        smoothed: series.smoothed.shifted(origin),
        derivative: series.derivative.shifted(origin),
    }
}
