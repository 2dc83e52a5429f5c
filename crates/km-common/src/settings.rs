//! Post-run analysis settings.

use serde::{Deserialize, Serialize};

/// Default Gaussian smoothing width: one minute, expressed in hours.
pub const DEFAULT_SMOOTHING_SCALE: f64 = 1.0 / 60.0;
/// Default unload temperature (°F, i.e. 50 °C).
pub const DEFAULT_UNLOAD_TEMPERATURE: f64 = 122.0;
/// Default band below the peak shown in the peak-focused plot.
pub const DEFAULT_PEAK_ZOOM: f64 = 300.0;

/// Knobs that shape the end-of-run analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Gaussian kernel width, in hours.
    pub smoothing_scale: f64,
    /// Samples above this temperature form the fire window.
    pub unload_temperature: f64,
    /// Temperature band below the maximum used for the peak window.
    pub peak_zoom: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            smoothing_scale: DEFAULT_SMOOTHING_SCALE,
            unload_temperature: DEFAULT_UNLOAD_TEMPERATURE,
            peak_zoom: DEFAULT_PEAK_ZOOM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let s: AnalysisSettings = serde_json::from_str(r#"{"peak_zoom": 150.0}"#).unwrap();
        assert_eq!(s.peak_zoom, 150.0);
        assert_eq!(s.smoothing_scale, DEFAULT_SMOOTHING_SCALE);
        assert_eq!(s.unload_temperature, DEFAULT_UNLOAD_TEMPERATURE);
    }
}
