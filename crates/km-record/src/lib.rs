//! Run record persistence for the kiln monitor.
//!
//! One firing run is stored as one JSON file:
//!
//! ```text
//! <storage_dir>/<YYYY_MM_DD-hh_mm>.json
//! ```
//!
//! The file carries the profile, the full ordered sample log, the start
//! timestamp, the recording flag and the analysis settings that were in
//! effect. Writes go through a temp file and a rename so a crash never
//! leaves a half-written record behind.
//!
//! # Example
//!
//! ```no_run
//! use km_record::{RecordStore, RunRecord};
//! use std::path::Path;
//!
//! let store = RecordStore::new("/var/lib/kiln-monitor/history");
//! let stored = store.persist(&RunRecord::default()).unwrap();
//! let back = RecordStore::load(&stored.path).unwrap();
//! assert_eq!(back.samples.len(), 0);
//! ```

pub mod error;
pub mod record;
pub mod store;

pub use error::{RecordError, Result};
pub use record::{compute_checksum, RunRecord};
pub use store::{write_atomic, RecordEntry, RecordStore, StoredRecord, RECORD_EXTENSION};
