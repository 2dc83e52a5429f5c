//! Viewer protocol messages.
//!
//! Two shapes travel to live viewers, one message per send:
//! - the backlog, sent once on attach:
//!   `{"type":"backlog","profile":{"name":..,"data":..,"type":"profile"}|null,"log":[..]}`
//! - live updates, sent every poll tick: the bare [`StateSample`] object.

use serde::{Deserialize, Serialize};

use crate::{Profile, StateSample};

/// Profile as embedded in the backlog message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub data: Vec<[f64; 2]>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&Profile> for ProfileInfo {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            data: profile.data.clone(),
            kind: "profile".to_string(),
        }
    }
}

/// History replayed to a newly attached viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub profile: Option<ProfileInfo>,
    pub log: Vec<StateSample>,
}

impl BacklogMessage {
    pub fn new(profile: Option<&Profile>, log: Vec<StateSample>) -> Self {
        Self {
            kind: "backlog".to_string(),
            profile: profile.map(ProfileInfo::from),
            log,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
