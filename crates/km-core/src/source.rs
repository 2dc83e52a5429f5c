//! Collaborators the monitor consumes: the state source and the control loop.

use std::time::Duration;

use thiserror::Error;

use km_common::{Profile, StateSample};

/// Why a sample could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transient: the tick is skipped and the poller retries next cadence.
    #[error("sample source unavailable: {0}")]
    Unavailable(String),

    /// Unrecoverable: the poller loop terminates.
    #[error("sample source failed: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Fatal(_))
    }
}

/// Why the control loop refused a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("control loop rejected command: {0}")]
    Rejected(String),

    #[error("control loop unavailable: {0}")]
    Unavailable(String),
}

/// Supplies process state on demand, at a fixed sampling interval.
pub trait SampleSource: Send + Sync {
    fn get_state(&self) -> Result<StateSample, SourceError>;

    /// Interval the poller sleeps between reads.
    fn time_step(&self) -> Duration;
}

/// The external control loop that actually drives the kiln.
pub trait ControlLoop: Send + Sync {
    /// Start executing `profile`, skipping the first `startat_minutes`.
    fn run_profile(&self, profile: &Profile, startat_minutes: f64) -> Result<(), ControlError>;

    /// Stop the current schedule. The next sample reports `ABORTED`.
    fn abort_run(&self) -> Result<(), ControlError>;
}
