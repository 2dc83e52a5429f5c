//! Minimal deterministic SVG line-plot writer.

use std::fmt::Write as _;

use km_math::{max_value, min_value, Series};

use crate::config::{PlotConfig, PX_PER_CM};
use crate::{ReportError, Result};

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 32.0;
const MARGIN_BOTTOM: f64 = 44.0;
const TARGET_TICKS: usize = 6;
const GRID_COLOR: &str = "#b0b0b0";

/// Default line colors, in order.
pub const PALETTE: [&str; 2] = ["#1f77b4", "#ff7f0e"];

/// One polyline.
#[derive(Debug, Clone)]
pub struct Line {
    pub series: Series,
    pub color: &'static str,
    pub width: f64,
}

/// A single-axes line plot.
#[derive(Debug, Clone)]
pub struct Figure {
    pub width_cm: f64,
    pub height_cm: f64,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Fixed x range; the data extent when `None`.
    pub x_range: Option<(f64, f64)>,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    x: (f64, f64),
    y: (f64, f64),
}

impl Frame {
    fn px(&self, v: f64) -> f64 {
        self.left + (v - self.x.0) / (self.x.1 - self.x.0) * self.width
    }

    fn py(&self, v: f64) -> f64 {
        self.top + self.height - (v - self.y.0) / (self.y.1 - self.y.0) * self.height
    }
}

impl Figure {
    pub fn new(config: &PlotConfig, hours: f64, title: impl Into<String>) -> Self {
        let (width_cm, height_cm) = config.size_cm(hours);
        Self {
            width_cm,
            height_cm,
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            x_range: None,
            lines: Vec::new(),
        }
    }

    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    pub fn line(mut self, series: Series, color: &'static str, width: f64) -> Self {
        self.lines.push(Line {
            series,
            color,
            width,
        });
        self
    }

    pub fn x_range(mut self, lo: f64, hi: f64) -> Self {
        self.x_range = Some((lo, hi));
        self
    }

    fn frame(&self, font_px: f64) -> Result<Frame> {
        let xs: Vec<f64> = self.lines.iter().flat_map(|l| l.series.x.iter().copied()).collect();
        let ys: Vec<f64> = self.lines.iter().flat_map(|l| l.series.y.iter().copied()).collect();
        if xs.is_empty() {
            return Err(ReportError::Render(format!("plot '{}' has no data", self.title)));
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(ReportError::Render(format!(
                "plot '{}' contains non-finite values",
                self.title
            )));
        }

        let x = match self.x_range {
            Some(r) => r,
            None => (
                min_value(&xs).unwrap_or(0.0),
                max_value(&xs).unwrap_or(0.0),
            ),
        };
        let x = widen(x);
        let (ymin, ymax) = (min_value(&ys).unwrap_or(0.0), max_value(&ys).unwrap_or(0.0));
        let pad = 0.05 * (ymax - ymin);
        let y = widen((ymin - pad, ymax + pad));

        let width_px = self.width_cm * PX_PER_CM;
        let height_px = self.height_cm * PX_PER_CM;
        let top = MARGIN_TOP + 0.25 * font_px;
        Ok(Frame {
            left: MARGIN_LEFT,
            top,
            width: (width_px - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            height: (height_px - top - MARGIN_BOTTOM).max(1.0),
            x,
            y,
        })
    }

    /// Render to an SVG document.
    pub fn to_svg(&self, config: &PlotConfig) -> Result<String> {
        let frame = self.frame(config.font_px)?;
        let width_px = self.width_cm * PX_PER_CM;
        let height_px = self.height_cm * PX_PER_CM;
        let font = config.font_px;

        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.2}cm" height="{:.2}cm" viewBox="0 0 {:.2} {:.2}" font-family="sans-serif">"#,
            self.width_cm, self.height_cm, width_px, height_px
        );
        let _ = writeln!(
            out,
            r#"<rect x="0" y="0" width="{width_px:.2}" height="{height_px:.2}" fill="white"/>"#
        );

        self.write_grid(&mut out, &frame, font);

        for line in &self.lines {
            let points: Vec<String> = line
                .series
                .x
                .iter()
                .zip(&line.series.y)
                .map(|(x, y)| format!("{:.2},{:.2}", frame.px(*x), frame.py(*y)))
                .collect();
            let _ = writeln!(
                out,
                r#"<polyline fill="none" stroke="{}" stroke-width="{:.2}" points="{}"/>"#,
                line.color,
                line.width,
                points.join(" ")
            );
        }

        let _ = writeln!(
            out,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="black" stroke-width="1"/>"#,
            frame.left, frame.top, frame.width, frame.height
        );
        let _ = writeln!(
            out,
            r#"<text x="{:.2}" y="{:.2}" font-size="{:.2}" text-anchor="middle">{}</text>"#,
            frame.left + frame.width / 2.0,
            MARGIN_TOP - 0.75 * font,
            1.25 * font,
            escape(&self.title)
        );
        let _ = writeln!(
            out,
            r#"<text x="{:.2}" y="{:.2}" font-size="{:.2}" text-anchor="middle">{}</text>"#,
            frame.left + frame.width / 2.0,
            height_px - 0.5 * font,
            font,
            escape(&self.x_label)
        );
        let (lx, ly) = (1.25 * font, frame.top + frame.height / 2.0);
        let _ = writeln!(
            out,
            r#"<text x="{lx:.2}" y="{ly:.2}" font-size="{font:.2}" text-anchor="middle" transform="rotate(-90 {lx:.2} {ly:.2})">{}</text>"#,
            escape(&self.y_label)
        );
        out.push_str("</svg>\n");
        Ok(out)
    }

    fn write_grid(&self, out: &mut String, frame: &Frame, font: f64) {
        let bottom = frame.top + frame.height;
        let right = frame.left + frame.width;

        let (x_step, x_ticks) = ticks(frame.x.0, frame.x.1);
        for v in minor_ticks(&x_ticks, x_step, frame.x) {
            let px = frame.px(v);
            let _ = writeln!(
                out,
                r#"<line x1="{px:.2}" y1="{:.2}" x2="{px:.2}" y2="{bottom:.2}" stroke="{GRID_COLOR}" stroke-width="0.5" stroke-dasharray="3,3"/>"#,
                frame.top
            );
        }
        for v in &x_ticks {
            let px = frame.px(*v);
            let _ = writeln!(
                out,
                r#"<line x1="{px:.2}" y1="{:.2}" x2="{px:.2}" y2="{bottom:.2}" stroke="{GRID_COLOR}" stroke-width="1" stroke-dasharray="4,3"/>"#,
                frame.top
            );
            let _ = writeln!(
                out,
                r#"<text x="{px:.2}" y="{:.2}" font-size="{font:.2}" text-anchor="middle">{}</text>"#,
                bottom + 1.4 * font,
                tick_label(*v, x_step)
            );
        }

        let (y_step, y_ticks) = ticks(frame.y.0, frame.y.1);
        for v in minor_ticks(&y_ticks, y_step, frame.y) {
            let py = frame.py(v);
            let _ = writeln!(
                out,
                r#"<line x1="{:.2}" y1="{py:.2}" x2="{right:.2}" y2="{py:.2}" stroke="{GRID_COLOR}" stroke-width="0.5" stroke-dasharray="3,3"/>"#,
                frame.left
            );
        }
        for v in &y_ticks {
            let py = frame.py(*v);
            let _ = writeln!(
                out,
                r#"<line x1="{:.2}" y1="{py:.2}" x2="{right:.2}" y2="{py:.2}" stroke="{GRID_COLOR}" stroke-width="1" stroke-dasharray="4,3"/>"#,
                frame.left
            );
            let _ = writeln!(
                out,
                r#"<text x="{:.2}" y="{:.2}" font-size="{font:.2}" text-anchor="end">{}</text>"#,
                frame.left - 0.4 * font,
                py + 0.35 * font,
                tick_label(*v, y_step)
            );
        }
    }
}

/// Give a degenerate range some extent.
fn widen((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

/// A 1/2/5 x 10^k step giving roughly [`TARGET_TICKS`] ticks over the span.
pub fn nice_step(span: f64) -> f64 {
    let raw = span / TARGET_TICKS as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let norm = raw / magnitude;
    let nice = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Major tick positions inside `[lo, hi]`, with their step.
pub fn ticks(lo: f64, hi: f64) -> (f64, Vec<f64>) {
    let step = nice_step(hi - lo);
    let first = (lo / step).ceil() as i64;
    let last = (hi / step + 1e-9).floor() as i64;
    (step, (first..=last).map(|k| k as f64 * step).collect())
}

fn minor_ticks(major: &[f64], step: f64, (lo, hi): (f64, f64)) -> Vec<f64> {
    let below = major.first().map(|v| v - step).into_iter();
    below
        .chain(major.iter().copied())
        .map(|v| v + 0.5 * step)
        .filter(|v| *v > lo && *v < hi)
        .collect()
}

fn tick_label(v: f64, step: f64) -> String {
    let decimals = (-step.log10().floor()).max(0.0) as usize;
    let s = format!("{v:.decimals$}");
    if s.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        s.trim_start_matches('-').to_string()
    } else {
        s
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
