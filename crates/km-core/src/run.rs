//! The in-memory run log and its recording state machine.
//!
//! ```text
//!   start_run ──► Armed ──RUNNING──► Recording ──non-RUNNING──► Finalized
//!                  │ ▲                  │ RUNNING: append
//!                  └─┘ other states: ignored
//! ```
//!
//! A run whose seed sample is already RUNNING starts in `Recording`.
//! A run is immutable once finalized; later samples are not appended.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;

use km_common::{AnalysisSettings, Profile, StateSample, RECORD_SCHEMA_VERSION};
use km_record::RunRecord;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Started, waiting for the first RUNNING sample.
    Armed,
    /// RUNNING samples are being appended.
    Recording,
    /// A non-RUNNING sample followed recording; no further changes.
    Finalized,
}

/// What one observed sample did to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    Ignored,
    /// First RUNNING sample: recording began and the sample was appended.
    RecordingStarted,
    /// Sample appended.
    Appended,
    /// Recording ended with this sample.
    Finalized,
}

/// One firing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    /// Correlation id for logs.
    pub id: String,
    pub profile: Option<Profile>,
    pub samples: Vec<StateSample>,
    pub started_at: DateTime<Local>,
    pub recording: bool,
    pub phase: RunPhase,
    pub analysis_settings: AnalysisSettings,
    pub notify_destinations: Vec<String>,
}

impl Run {
    /// A freshly started run, seeded with `seed` when one is available.
    ///
    /// A RUNNING seed means the control loop is already executing the
    /// schedule, so the run starts out recording.
    pub fn start(
        id: impl Into<String>,
        profile: Option<Profile>,
        notify_destinations: Vec<String>,
        analysis_settings: AnalysisSettings,
        seed: Option<StateSample>,
    ) -> Self {
        let recording = seed.is_some_and(|s| s.is_running());
        Self {
            id: id.into(),
            profile,
            samples: seed.into_iter().collect(),
            started_at: Local::now(),
            recording,
            phase: if recording {
                RunPhase::Recording
            } else {
                RunPhase::Armed
            },
            analysis_settings,
            notify_destinations,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == RunPhase::Finalized
    }

    pub fn profile_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("unknown")
    }

    /// Feed one polled sample through the state machine.
    pub fn observe(&mut self, sample: &StateSample) -> Transition {
        match (self.phase, sample.is_running()) {
            (RunPhase::Armed, true) => {
                // A seed taken before the control loop reset its clock would
                // break runtime ordering; drop it.
                if self.samples.iter().any(|s| s.runtime > sample.runtime) {
                    self.samples.clear();
                }
                self.samples.push(*sample);
                self.recording = true;
                self.phase = RunPhase::Recording;
                Transition::RecordingStarted
            }
            (RunPhase::Recording, true) => {
                if self
                    .samples
                    .last()
                    .is_some_and(|last| sample.runtime < last.runtime)
                {
                    warn!(run_id = %self.id, runtime = sample.runtime, "dropping out-of-order sample");
                    return Transition::Ignored;
                }
                self.samples.push(*sample);
                Transition::Appended
            }
            (RunPhase::Recording, false) => {
                self.recording = false;
                self.phase = RunPhase::Finalized;
                Transition::Finalized
            }
            (RunPhase::Armed, false) | (RunPhase::Finalized, _) => Transition::Ignored,
        }
    }

    /// Persistable snapshot of this run.
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            schema_version: RECORD_SCHEMA_VERSION.to_string(),
            started_at: self.started_at,
            profile: self.profile.clone(),
            recording: self.recording,
            analysis_settings: self.analysis_settings,
            notify_destinations: self.notify_destinations.clone(),
            samples: self.samples.clone(),
        }
    }
}
