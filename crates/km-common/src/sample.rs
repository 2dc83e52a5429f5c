//! Process state samples produced by the control loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CommonError;

/// Control loop state as reported in every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FiringState {
    /// No schedule is executing.
    #[default]
    Idle,
    /// A schedule is executing and samples are being recorded.
    Running,
    /// The schedule reached its last set-point.
    Complete,
    /// The schedule was stopped by an operator.
    Aborted,
    /// The control loop hit a hardware or safety fault.
    Error,
}

impl FiringState {
    /// True for states that end a run (everything but `Idle` and `Running`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Aborted => "ABORTED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for FiringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FiringState {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IDLE" => Ok(Self::Idle),
            "RUNNING" => Ok(Self::Running),
            "COMPLETE" => Ok(Self::Complete),
            "ABORTED" => Ok(Self::Aborted),
            "ERROR" => Ok(Self::Error),
            _ => Err(CommonError::UnknownState(s.to_string())),
        }
    }
}

/// One observation of the heating process.
///
/// Immutable once produced. `runtime` is seconds since the control loop
/// started the current schedule and never decreases within a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSample {
    /// Seconds elapsed in the schedule.
    pub runtime: f64,
    /// Measured kiln temperature.
    pub temperature: f64,
    /// Set-point the controller is tracking.
    pub target_temperature: f64,
    /// Heater duty in `[0, 1]`.
    pub heat_output: f64,
    /// Control loop state.
    pub state: FiringState,
}

impl StateSample {
    pub fn new(runtime: f64, temperature: f64, state: FiringState) -> Self {
        Self {
            runtime,
            temperature,
            target_temperature: temperature,
            heat_output: 0.0,
            state,
        }
    }

    pub fn with_target(mut self, target_temperature: f64) -> Self {
        self.target_temperature = target_temperature;
        self
    }

    pub fn with_heat_output(mut self, heat_output: f64) -> Self {
        self.heat_output = heat_output;
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == FiringState::Running
    }

    /// Serialize as the live-update viewer message (the bare sample object).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","state":"{}"}}"#,
                self.state
            )
        })
    }
}
