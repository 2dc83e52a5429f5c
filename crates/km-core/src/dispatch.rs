//! End-of-run persistence, analysis and delivery.
//!
//! `finalize` always persists first. Analysis and delivery happen only when
//! the run names recipients, and their failures are reported with the path
//! of the record that is already safely on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use km_record::{write_atomic, RecordError, RecordStore, RunRecord, StoredRecord};
use km_report::{
    render_plots, AnalysisEngine, Attachment, Notification, PlotConfig, ReportError,
    JSON_CONTENT_TYPE,
};

use crate::config::MonitorConfig;
use crate::notify::{notifier_from_config, Notifier, NotifyError, Reachability, StaticUrl};
use crate::run::Run;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not persist run: {0}")]
    Persistence(#[source] RecordError),

    #[error("analysis of {path} failed: {source}")]
    Analysis {
        path: PathBuf,
        #[source]
        source: ReportError,
    },

    #[error("delivery of {path} failed: {source}")]
    Delivery {
        path: PathBuf,
        #[source]
        source: NotifyError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    /// Path of the persisted record, when persistence succeeded.
    pub fn record_path(&self) -> Option<&Path> {
        match self {
            DispatchError::Persistence(_) => None,
            DispatchError::Analysis { path, .. }
            | DispatchError::Delivery { path, .. }
            | DispatchError::Io { path, .. } => Some(path),
        }
    }
}

/// What a successful delivery sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySummary {
    pub transport: &'static str,
    pub recipients: usize,
    pub attachments: usize,
    /// Plot files written next to the record.
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// No recipients: the record on disk is the end state.
    Archived(StoredRecord),
    Delivered {
        stored: StoredRecord,
        summary: DeliverySummary,
    },
}

impl DispatchOutcome {
    pub fn stored(&self) -> &StoredRecord {
        match self {
            DispatchOutcome::Archived(stored) | DispatchOutcome::Delivered { stored, .. } => stored,
        }
    }
}

/// Result of the best-effort "run started" message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartNotice {
    Sent,
    Skipped(&'static str),
    Failed(String),
}

pub struct ReportDispatcher {
    store: RecordStore,
    notifier: Arc<dyn Notifier>,
    reachability: Option<Arc<dyn Reachability>>,
    sender_name: String,
    plot_config: PlotConfig,
    write_artifacts: bool,
}

impl ReportDispatcher {
    pub fn new(store: RecordStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            reachability: None,
            sender_name: "Kiln Monitor".to_string(),
            plot_config: PlotConfig::default(),
            write_artifacts: true,
        }
    }

    /// Dispatcher wired from configuration: store, transport and public URL.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            RecordStore::new(&config.storage_dir),
            notifier_from_config(&config.notify),
        )
        .with_sender_name(config.notify.sender_name.clone())
        .with_reachability(Arc::new(StaticUrl(config.public_url.clone())))
    }

    pub fn with_reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    /// Whether rendered plots are also written next to the record.
    pub fn with_artifacts(mut self, enabled: bool) -> Self {
        self.write_artifacts = enabled;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Persist a finished run, then analyze and deliver it if it has recipients.
    pub fn finalize(&self, run: &Run) -> Result<DispatchOutcome, DispatchError> {
        let record = run.to_record();
        let stored = self
            .store
            .persist(&record)
            .map_err(DispatchError::Persistence)?;
        info!(
            run_id = %run.id,
            key = %stored.key,
            path = %stored.path.display(),
            samples = record.samples.len(),
            sha256 = %stored.sha256,
            "run persisted"
        );

        if record.notify_destinations.is_empty() {
            info!(run_id = %run.id, "no recipients; run archived only");
            return Ok(DispatchOutcome::Archived(stored));
        }

        let summary = self.deliver_report(&record, &stored.key, &stored.path, &record.notify_destinations)?;
        Ok(DispatchOutcome::Delivered { stored, summary })
    }

    /// Re-run analysis and delivery for a stored record without rewriting it.
    pub fn resend(&self, path: &Path, destinations: &[String]) -> Result<DeliverySummary, DispatchError> {
        let record = RecordStore::load(path).map_err(DispatchError::Persistence)?;
        let key = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.key());
        info!(path = %path.display(), recipients = destinations.len(), "resending report");
        self.deliver_report(&record, &key, path, destinations)
    }

    fn deliver_report(
        &self,
        record: &RunRecord,
        key: &str,
        path: &Path,
        destinations: &[String],
    ) -> Result<DeliverySummary, DispatchError> {
        let analysis_err = |source: ReportError| DispatchError::Analysis {
            path: path.to_path_buf(),
            source,
        };

        let report = AnalysisEngine::analyze_record(record).map_err(analysis_err)?;
        let plots = render_plots(&report, &record.started_at, &self.plot_config).map_err(analysis_err)?;

        let artifacts = if self.write_artifacts {
            self.write_plot_artifacts(key, &plots)
        } else {
            Vec::new()
        };

        let raw = std::fs::read(path).map_err(|source| DispatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{key}.json"));
        let notification = Notification::report(
            &record.started_at,
            &self.sender_name,
            destinations,
            &report,
            &plots,
            Attachment::new(filename, JSON_CONTENT_TYPE, raw),
        );

        self.notifier
            .deliver(&notification)
            .map_err(|source| DispatchError::Delivery {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            transport = self.notifier.name(),
            recipients = destinations.len(),
            max_temperature_raw = report.max_temperature_raw,
            fire_duration_hours = report.fire_duration_hours,
            "report delivered"
        );
        Ok(DeliverySummary {
            transport: self.notifier.name(),
            recipients: destinations.len(),
            attachments: notification.attachments.len(),
            artifacts,
        })
    }

    /// Plot files are a convenience for manual resends; failures only warn.
    fn write_plot_artifacts(&self, key: &str, plots: &[km_report::Plot]) -> Vec<PathBuf> {
        let mut written = Vec::with_capacity(plots.len());
        for plot in plots {
            let path = self.store.dir().join(format!("{key}-{}", plot.filename()));
            match write_atomic(&path, plot.svg.as_bytes()) {
                Ok(()) => written.push(path),
                Err(e) => warn!(path = %path.display(), error = %e, "could not write plot artifact"),
            }
        }
        written
    }

    /// Tell the run's recipients where the live monitor can be reached.
    ///
    /// Never fails the caller: a missing URL, no recipients or a delivery
    /// error is logged and reported in the returned notice.
    pub fn notify_start(&self, run: &Run) -> StartNotice {
        if run.notify_destinations.is_empty() {
            return StartNotice::Skipped("no recipients");
        }
        let Some(url) = self.reachability.as_ref().and_then(|r| r.public_url()) else {
            info!(run_id = %run.id, "public URL unavailable; start notice skipped");
            return StartNotice::Skipped("no public url");
        };
        let notification = Notification::run_started(
            &run.started_at,
            &self.sender_name,
            &run.notify_destinations,
            run.profile_name(),
            &url,
        );
        match self.notifier.deliver(&notification) {
            Ok(()) => {
                info!(run_id = %run.id, url = %url, "start notice sent");
                StartNotice::Sent
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "start notice not delivered");
                StartNotice::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NullNotifier, OutboxNotifier};
    use km_common::{AnalysisSettings, FiringState, Profile, StateSample};
    use tempfile::tempdir;

    fn finished_run(destinations: Vec<String>) -> Run {
        let mut run = Run::start(
            "run-dispatch",
            Some(Profile::new("bisque", vec![[0.0, 70.0], [3600.0, 900.0]])),
            destinations,
            AnalysisSettings::default(),
            None,
        );
        for i in 0..=120 {
            let t = i as f64 * 30.0;
            run.observe(&StateSample::new(t, 70.0 + t / 4.0, FiringState::Running));
        }
        run.observe(&StateSample::new(3630.0, 960.0, FiringState::Complete));
        run
    }

    fn outbox_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn no_recipients_archives_only() {
        let dir = tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let dispatcher = ReportDispatcher::new(
            RecordStore::new(dir.path().join("history")),
            Arc::new(OutboxNotifier::new(&outbox)),
        );
        let outcome = dispatcher.finalize(&finished_run(vec![])).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Archived(_)));
        assert!(outcome.stored().path.exists());
        assert!(outbox_files(&outbox).is_empty());
        // No analysis ran, so no plot artifacts either.
        assert_eq!(outbox_files(&dir.path().join("history")).len(), 1);
    }

    #[test]
    fn recipients_get_report_with_attachments() {
        let dir = tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let dispatcher = ReportDispatcher::new(
            RecordStore::new(dir.path().join("history")),
            Arc::new(OutboxNotifier::new(&outbox)),
        );
        let outcome = dispatcher
            .finalize(&finished_run(vec!["kiln@example.org".into()]))
            .unwrap();
        let DispatchOutcome::Delivered { stored, summary } = outcome else {
            panic!("expected delivery");
        };
        assert_eq!(summary.transport, "outbox");
        assert_eq!(summary.recipients, 1);
        assert_eq!(summary.attachments, summary.artifacts.len() + 1);
        for artifact in &summary.artifacts {
            assert!(artifact.exists());
        }

        let envelopes = outbox_files(&outbox);
        assert_eq!(envelopes.len(), 1);
        let sent: Notification =
            serde_json::from_slice(&std::fs::read(&envelopes[0]).unwrap()).unwrap();
        assert!(sent.subject.starts_with("[kiln report] "));
        let raw = sent.attachments.last().unwrap();
        assert_eq!(raw.data, std::fs::read(&stored.path).unwrap());
    }

    #[test]
    fn delivery_failure_keeps_the_record() {
        let dir = tempdir().unwrap();
        let dispatcher = ReportDispatcher::new(
            RecordStore::new(dir.path()),
            Arc::new(NullNotifier),
        )
        .with_artifacts(false);
        let err = dispatcher
            .finalize(&finished_run(vec!["kiln@example.org".into()]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Delivery { source: NotifyError::NotConfigured, .. }));
        let path = err.record_path().unwrap();
        assert!(RecordStore::load(path).is_ok());
    }

    #[test]
    fn invalid_smoothing_is_surfaced_after_persisting() {
        let dir = tempdir().unwrap();
        let dispatcher = ReportDispatcher::new(RecordStore::new(dir.path()), Arc::new(NullNotifier));
        let mut run = finished_run(vec!["kiln@example.org".into()]);
        // 6 sigma is shorter than the 30 s sample spacing.
        run.analysis_settings.smoothing_scale = 1.0 / 3600.0;
        let err = dispatcher.finalize(&run).unwrap_err();
        match &err {
            DispatchError::Analysis { source, .. } => assert!(source.is_invalid_parameter()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.record_path().unwrap().exists());
    }

    #[test]
    fn resend_reuses_stored_record() {
        let dir = tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let store = RecordStore::new(dir.path().join("history"));
        let stored = store.persist(&finished_run(vec![]).to_record()).unwrap();
        let before = std::fs::read(&stored.path).unwrap();

        let dispatcher = ReportDispatcher::new(store, Arc::new(OutboxNotifier::new(&outbox)));
        let summary = dispatcher
            .resend(&stored.path, &["a@example.org".to_string(), "b@example.org".to_string()])
            .unwrap();
        assert_eq!(summary.recipients, 2);
        assert_eq!(std::fs::read(&stored.path).unwrap(), before);
        assert_eq!(outbox_files(&outbox).len(), 1);
    }

    #[test]
    fn start_notice_needs_url_and_recipients() {
        let dir = tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let dispatcher = ReportDispatcher::new(
            RecordStore::new(dir.path()),
            Arc::new(OutboxNotifier::new(&outbox)),
        );
        let run = finished_run(vec!["kiln@example.org".into()]);
        assert_eq!(dispatcher.notify_start(&run), StartNotice::Skipped("no public url"));
        assert_eq!(
            dispatcher.notify_start(&finished_run(vec![])),
            StartNotice::Skipped("no recipients")
        );

        let dispatcher = dispatcher.with_reachability(Arc::new(StaticUrl(Some(
            "https://kiln.example.net".into(),
        ))));
        assert_eq!(dispatcher.notify_start(&run), StartNotice::Sent);
        let envelopes = outbox_files(&outbox);
        let sent: Notification =
            serde_json::from_slice(&std::fs::read(&envelopes[0]).unwrap()).unwrap();
        assert_eq!(
            sent.body,
            "Firing of profile bisque started, monitor reachable at https://kiln.example.net"
        );
    }

    #[test]
    fn start_notice_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let dispatcher = ReportDispatcher::new(RecordStore::new(dir.path()), Arc::new(NullNotifier))
            .with_reachability(Arc::new(StaticUrl(Some("https://kiln.example.net".into()))));
        let notice = dispatcher.notify_start(&finished_run(vec!["a@example.org".into()]));
        assert!(matches!(notice, StartNotice::Failed(_)));
    }
}
