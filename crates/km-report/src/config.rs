//! Plot layout configuration.

use serde::{Deserialize, Serialize};

/// SVG user units per centimetre (96 dpi).
pub const PX_PER_CM: f64 = 96.0 / 2.54;

/// Physical layout of rendered plots.
///
/// Plots are `height_cm` tall and `cm_per_hour` wide per hour of firing,
/// never narrower than they are tall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub height_cm: f64,
    pub cm_per_hour: f64,
    /// Font size of tick labels, in px. Titles are 1.25x larger.
    pub font_px: f64,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            height_cm: 10.0,
            cm_per_hour: 5.0,
            font_px: 11.0,
        }
    }
}

impl PlotConfig {
    /// `(width, height)` in cm for a plot covering `hours`.
    pub fn size_cm(&self, hours: f64) -> (f64, f64) {
        let width = (self.cm_per_hour * hours).max(self.height_cm);
        (width, self.height_cm)
    }
}
