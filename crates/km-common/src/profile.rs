//! Firing schedules.
//!
//! A profile is the picoreflow-style schedule the control loop executes:
//! a name plus ordered `[seconds, temperature]` set-points. The monitor
//! treats it as opaque apart from its name, but the simulator and the
//! viewer backlog need the set-points too.

use serde::{Deserialize, Serialize};

use crate::{CommonError, Result};

/// A named firing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// `[seconds, temperature]` set-points ordered by time.
    #[serde(default)]
    pub data: Vec<[f64; 2]>,
}

impl Profile {
    pub fn new(name: impl Into<String>, data: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Parse a profile from the JSON the route layer stores on disk.
    ///
    /// Extra keys such as `"type": "profile"` are ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Profile = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check that set-points are finite and ordered by time.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("profile name is empty"));
        }
        for point in &self.data {
            if !point[0].is_finite() || !point[1].is_finite() {
                return Err(self.invalid("set-point is not finite"));
            }
        }
        if self.data.windows(2).any(|w| w[1][0] < w[0][0]) {
            return Err(self.invalid("set-points are not ordered by time"));
        }
        Ok(())
    }

    /// Schedule length in seconds (time of the last set-point).
    pub fn duration(&self) -> f64 {
        self.data.last().map(|p| p[0]).unwrap_or(0.0)
    }

    /// Target temperature at `runtime` seconds, linearly interpolated.
    ///
    /// Clamps to the first/last set-point outside the schedule. Returns
    /// `None` for an empty schedule.
    pub fn target_at(&self, runtime: f64) -> Option<f64> {
        let first = self.data.first()?;
        let last = self.data.last()?;
        if runtime <= first[0] {
            return Some(first[1]);
        }
        if runtime >= last[0] {
            return Some(last[1]);
        }
        let upper = self.data.partition_point(|p| p[0] <= runtime);
        let (a, b) = (self.data[upper - 1], self.data[upper]);
        let span = b[0] - a[0];
        if span <= 0.0 {
            return Some(b[1]);
        }
        Some(a[1] + (b[1] - a[1]) * (runtime - a[0]) / span)
    }

    fn invalid(&self, reason: &str) -> CommonError {
        CommonError::InvalidProfile {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}
