//! Report plots.
//!
//! Three fixed plots, rendered as standalone SVG documents:
//! - `1_temperature`: raw and smoothed temperature over the fire window
//! - `2_temperature_ramp`: derivative of the smoothed temperature
//! - `3_peak_temperature`: raw and smoothed temperature near the peak,
//!   only when the report carries a peak window

pub mod svg;

use chrono::{DateTime, Local};
use serde::Serialize;

use km_common::stamp;

use crate::config::PlotConfig;
use crate::engine::{DerivedSeries, Report};
use crate::Result;

use self::svg::{Figure, PALETTE};

pub const TIME_LABEL: &str = "time [hours]";
pub const TEMPERATURE_LABEL: &str = "temperature [F]";
pub const RAMP_LABEL: &str = "temperature ramp [F/hour]";

/// Which plot a rendered artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Temperature,
    TemperatureRamp,
    PeakTemperature,
}

impl PlotKind {
    pub fn stem(self) -> &'static str {
        match self {
            PlotKind::Temperature => "1_temperature",
            PlotKind::TemperatureRamp => "2_temperature_ramp",
            PlotKind::PeakTemperature => "3_peak_temperature",
        }
    }
}

/// A rendered plot.
#[derive(Debug, Clone)]
pub struct Plot {
    pub kind: PlotKind,
    pub svg: String,
}

impl Plot {
    pub fn filename(&self) -> String {
        format!("{}.svg", self.kind.stem())
    }
}

/// Plot title for a run started at `started_at`.
pub fn title(started_at: &DateTime<Local>) -> String {
    format!("Fire started {}", stamp::display_stamp(started_at))
}

fn temperature_figure(config: &PlotConfig, series: &DerivedSeries, title: &str) -> Figure {
    let (lo, hi) = series.time_span();
    Figure::new(config, hi - lo, title)
        .labels(TIME_LABEL, TEMPERATURE_LABEL)
        .x_range(lo, hi)
        .line(series.raw.clone(), PALETTE[0], 1.0)
        .line(series.smoothed.clone(), PALETTE[1], 1.5)
}

/// Render every plot the report supports, in attachment order.
pub fn render_plots(
    report: &Report,
    started_at: &DateTime<Local>,
    config: &PlotConfig,
) -> Result<Vec<Plot>> {
    let title = title(started_at);
    let full = &report.full_series;
    let mut plots = Vec::with_capacity(3);

    plots.push(Plot {
        kind: PlotKind::Temperature,
        svg: temperature_figure(config, full, &title).to_svg(config)?,
    });

    let (lo, hi) = full.time_span();
    plots.push(Plot {
        kind: PlotKind::TemperatureRamp,
        svg: Figure::new(config, hi - lo, title.as_str())
            .labels(TIME_LABEL, RAMP_LABEL)
            .line(full.derivative.clone(), PALETTE[0], 1.0)
            .to_svg(config)?,
    });

    if let Some(peak) = &report.peak_window_series {
        plots.push(Plot {
            kind: PlotKind::PeakTemperature,
            svg: temperature_figure(config, peak, &title).to_svg(config)?,
        });
    }
    Ok(plots)
}
