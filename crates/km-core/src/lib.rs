//! Kiln monitor core.
//!
//! - [`run`]: the run log and its recording state machine
//! - [`hub`]: live viewer fan-out and backlog replay
//! - [`poller`]: the fixed-cadence poll loop
//! - [`dispatch`]: persist, analyze and deliver finished runs
//! - [`monitor`]: the context object tying them together
//! - [`simulator`]: a simulated kiln for demos and tests
//!
//! The `km` binary entry point is in `main.rs`.

pub mod config;
pub mod dispatch;
pub mod exit_codes;
pub mod hub;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod poller;
pub mod run;
pub mod simulator;
pub mod source;

pub use config::{load_config, MonitorConfig};
pub use dispatch::{DispatchError, DispatchOutcome, ReportDispatcher, StartNotice};
pub use hub::{Observer, ObserverHub, SendOutcome};
pub use monitor::{DispatchReport, Monitor, MonitorError};
pub use poller::{PollerExit, PollerHandle, PollerState};
pub use run::{Run, RunPhase};
pub use simulator::SimulatedKiln;
pub use source::{ControlLoop, SampleSource};
