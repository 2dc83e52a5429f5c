//! The persisted form of one firing run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use km_common::{stamp, AnalysisSettings, Profile, StateSample, RECORD_SCHEMA_VERSION};

use crate::{RecordError, Result};

/// Everything needed to re-run analysis for a finished firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Schema version of the record file.
    pub schema_version: String,

    /// Wall-clock time the run was started.
    pub started_at: DateTime<Local>,

    /// Schedule that was executing, if known.
    pub profile: Option<Profile>,

    /// Whether the first RUNNING sample was ever observed.
    pub recording: bool,

    /// Analysis settings in effect for this run.
    pub analysis_settings: AnalysisSettings,

    /// Where the report should go.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notify_destinations: Vec<String>,

    /// Ordered sample log.
    pub samples: Vec<StateSample>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION.to_string(),
            started_at: Local::now(),
            profile: None,
            recording: false,
            analysis_settings: AnalysisSettings::default(),
            notify_destinations: Vec::new(),
            samples: Vec::new(),
        }
    }
}

impl RunRecord {
    pub fn new(started_at: DateTime<Local>, profile: Option<Profile>) -> Self {
        Self {
            started_at,
            profile,
            ..Default::default()
        }
    }

    /// Base record key, `YYYY_MM_DD-hh_mm` of the start time.
    pub fn key(&self) -> String {
        stamp::record_key(&self.started_at)
    }

    /// Profile name, or `"unknown"` when the run had none.
    pub fn profile_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("unknown")
    }

    /// Serialize to pretty JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|source| RecordError::Json { path: None, source })
    }

    /// Parse from JSON bytes and check the schema major version.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let record: RunRecord =
            serde_json::from_slice(bytes).map_err(|source| RecordError::Json { path: None, source })?;
        record.check_version()?;
        Ok(record)
    }

    fn check_version(&self) -> Result<()> {
        let major = |v: &str| v.split('.').next().map(str::to_string);
        if major(&self.schema_version) != major(RECORD_SCHEMA_VERSION) {
            return Err(RecordError::UnsupportedVersion {
                version: self.schema_version.clone(),
                supported: RECORD_SCHEMA_VERSION.to_string(),
            });
        }
        Ok(())
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
