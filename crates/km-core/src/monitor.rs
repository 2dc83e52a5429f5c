//! The monitor context: one owned instance of run log, hub and poller.
//!
//! A [`Monitor`] is what the route layer talks to. It forwards run commands
//! to the control loop, keeps the active [`Run`], attaches viewers and hands
//! finalized runs to the [`ReportDispatcher`] on a separate thread so the
//! poll cadence never waits on analysis or delivery.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use km_common::{AnalysisSettings, BacklogMessage, CommonError, Profile};

use crate::config::MonitorConfig;
use crate::dispatch::{DispatchError, DispatchOutcome, ReportDispatcher, StartNotice};
use crate::hub::{backlog_subset, Observer, SendOutcome};
use crate::logging::generate_run_id;
use crate::poller::{self, MonitorEventType, PollerHandle, PollerState, Shared};
use crate::run::Run;
use crate::source::{ControlError, ControlLoop, SampleSource};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Profile(#[from] CommonError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("could not start poller thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result of dispatching one finalized run.
#[derive(Debug)]
pub struct DispatchReport {
    pub run_id: String,
    pub result: Result<DispatchOutcome, DispatchError>,
}

pub struct Monitor {
    shared: Arc<Shared>,
    source: Arc<dyn SampleSource>,
    control: Arc<dyn ControlLoop>,
    dispatcher: Arc<ReportDispatcher>,
    analysis: AnalysisSettings,
    dispatch_tx: Sender<DispatchReport>,
    dispatch_rx: Mutex<Receiver<DispatchReport>>,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        source: Arc<dyn SampleSource>,
        control: Arc<dyn ControlLoop>,
        dispatcher: ReportDispatcher,
    ) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::channel();
        Self {
            shared: Arc::new(Shared::new(config.backlog_max_points)),
            source,
            control,
            dispatcher: Arc::new(dispatcher),
            analysis: config.analysis,
            dispatch_tx,
            dispatch_rx: Mutex::new(dispatch_rx),
        }
    }

    /// Start the poll loop. Finalized runs are dispatched in the background;
    /// collect their results with [`Monitor::wait_for_dispatch`].
    pub fn spawn(&self) -> Result<PollerHandle, MonitorError> {
        let shared = Arc::clone(&self.shared);
        let dispatcher = Arc::clone(&self.dispatcher);
        let tx = self.dispatch_tx.clone();
        let handle = poller::spawn(Arc::clone(&self.shared), Arc::clone(&self.source), move |run| {
            dispatch_in_background(&shared, &dispatcher, &tx, run);
        })?;
        Ok(handle)
    }

    /// Start executing `profile` and begin a fresh run log.
    ///
    /// The run is seeded with one immediate sample so viewers always have a
    /// point to draw. A start notice is attempted afterwards; its outcome
    /// never fails the command.
    pub fn start_run(
        &self,
        profile: Profile,
        startat_minutes: f64,
        destinations: Vec<String>,
    ) -> Result<StartNotice, MonitorError> {
        profile.validate()?;
        self.control.run_profile(&profile, startat_minutes)?;

        let seed = match self.source.get_state() {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!(error = %e, "could not read seed sample");
                None
            }
        };
        let run = Run::start(
            generate_run_id(),
            Some(profile),
            destinations,
            self.analysis,
            seed,
        );
        info!(
            run_id = %run.id,
            profile = %run.profile_name(),
            startat_minutes,
            recipients = run.notify_destinations.len(),
            "run started"
        );

        let snapshot = run.clone();
        {
            let mut guard = self.shared.run.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = guard.as_ref().filter(|r| !r.is_finalized()) {
                warn!(run_id = %previous.id, "replacing a run that never finalized");
            }
            *guard = Some(run);
        }
        self.shared.state().record_event(
            MonitorEventType::RunStarted,
            &format!("{} ({})", snapshot.id, snapshot.profile_name()),
        );

        Ok(self.dispatcher.notify_start(&snapshot))
    }

    /// Ask the control loop to stop. The run finalizes when the poller sees
    /// the resulting ABORTED sample.
    pub fn abort_run(&self) -> Result<(), MonitorError> {
        self.control.abort_run()?;
        info!("abort requested");
        self.shared
            .state()
            .record_event(MonitorEventType::RunAborted, "abort requested");
        Ok(())
    }

    /// Replay the backlog to `observer` and register it for live samples.
    ///
    /// The backlog is cut and the observer reserved under the run read lock,
    /// so every sample is either in the backlog or streamed live. The
    /// backlog itself is sent after the lock is released; samples polled in
    /// the meantime are queued for this observer only.
    pub fn attach_observer(&self, observer: &Arc<dyn Observer>) -> SendOutcome {
        let (backlog, reservation) = {
            let guard = self.shared.run.read().unwrap_or_else(PoisonError::into_inner);
            let max_points = self.shared.hub.backlog_max_points();
            let backlog = match guard.as_ref() {
                Some(run) => BacklogMessage::new(
                    run.profile.as_ref(),
                    backlog_subset(&run.samples, max_points),
                ),
                None => BacklogMessage::new(None, Vec::new()),
            };
            (backlog, self.shared.hub.reserve(observer))
        };
        self.shared.hub.complete(reservation, observer, &backlog)
    }

    pub fn detach_observer(&self, observer: &Arc<dyn Observer>) -> bool {
        self.shared.hub.detach(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.shared.hub.len()
    }

    pub fn current_run(&self) -> Option<Run> {
        self.shared
            .run
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn poller_state(&self) -> PollerState {
        self.shared.state().clone()
    }

    /// Next finished dispatch, waiting up to `timeout`.
    pub fn wait_for_dispatch(&self, timeout: Duration) -> Option<DispatchReport> {
        self.dispatch_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv_timeout(timeout)
            .ok()
    }
}

fn dispatch_in_background(
    shared: &Arc<Shared>,
    dispatcher: &Arc<ReportDispatcher>,
    tx: &Sender<DispatchReport>,
    run: Run,
) {
    let job = {
        let shared = Arc::clone(shared);
        let dispatcher = Arc::clone(dispatcher);
        let tx = tx.clone();
        move |run: Run| {
            let result = dispatcher.finalize(&run);
            record_dispatch(&shared, &run, &result);
            let _ = tx.send(DispatchReport {
                run_id: run.id.clone(),
                result,
            });
        }
    };
    let spawned = std::thread::Builder::new()
        .name("km-dispatch".to_string())
        .spawn({
            let job = job.clone();
            let run = run.clone();
            move || job(run)
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not spawn dispatch thread; dispatching inline");
        job(run);
    }
}

fn record_dispatch(shared: &Shared, run: &Run, result: &Result<DispatchOutcome, DispatchError>) {
    let mut state = shared.state();
    match result {
        Ok(outcome) => {
            let detail = match outcome {
                DispatchOutcome::Archived(stored) => format!("{} archived", stored.key),
                DispatchOutcome::Delivered { stored, summary } => format!(
                    "{} delivered to {} recipient(s) via {}",
                    stored.key, summary.recipients, summary.transport
                ),
            };
            state.record_event(MonitorEventType::DispatchCompleted, &detail);
        }
        Err(e) => {
            error!(
                run_id = %run.id,
                error = %e,
                record = ?e.record_path(),
                "dispatch failed"
            );
            state.record_event(MonitorEventType::DispatchFailed, &e.to_string());
        }
    }
}
