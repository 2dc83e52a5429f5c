//! End-of-run analysis and reporting for the kiln monitor.
//!
//! Turns a finished run into:
//! - a [`Report`]: peak temperatures, time above the unload temperature and
//!   the derived series used for plotting
//! - SVG plots of those series ([`plots`])
//! - a [`Notification`] ready for a transport to deliver
//!
//! # Example
//!
//! ```no_run
//! use km_report::{plots, AnalysisEngine, PlotConfig};
//! use km_record::RecordStore;
//! use std::path::Path;
//!
//! let record = RecordStore::load(Path::new("2024_03_05-14_07.json")).unwrap();
//! let report = AnalysisEngine::analyze_record(&record).unwrap();
//! let rendered = plots::render_plots(&report, &record.started_at, &PlotConfig::default()).unwrap();
//! println!("{} plots, peak {:.2}", rendered.len(), report.max_temperature_raw);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod notification;
pub mod plots;

pub use config::PlotConfig;
pub use engine::{AnalysisEngine, DerivedSeries, Report};
pub use error::{ReportError, Result};
pub use notification::{report_body, Attachment, Notification, JSON_CONTENT_TYPE, SVG_CONTENT_TYPE};
pub use plots::{render_plots, Plot, PlotKind};
