//! Kiln monitor shared types.
//!
//! This crate holds the value types every other kiln-monitor crate speaks:
//! - [`StateSample`] / [`FiringState`]: one observation of the control loop
//! - [`Profile`]: the firing schedule being executed
//! - [`AnalysisSettings`]: knobs for post-run analysis
//! - [`protocol`]: the two message shapes sent to live viewers
//! - [`stamp`]: timestamp formatting for record keys and report titles

pub mod error;
pub mod profile;
pub mod protocol;
pub mod sample;
pub mod settings;
pub mod stamp;

pub use error::{CommonError, Result};
pub use profile::Profile;
pub use protocol::{BacklogMessage, ProfileInfo};
pub use sample::{FiringState, StateSample};
pub use settings::AnalysisSettings;

/// Schema version stamped into persisted run records.
pub const RECORD_SCHEMA_VERSION: &str = "1.0.0";
