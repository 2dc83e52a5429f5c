//! The background poll loop.
//!
//! - [`process_tick`]: one synchronous iteration (read, record, broadcast),
//!   the unit the tests drive directly.
//! - [`spawn`]: runs ticks on a dedicated thread at the source's cadence
//!   until shutdown or a fatal source error.
//! - [`PollerState`]: tick counters plus a bounded ring of recent events.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use km_common::StateSample;

use crate::hub::{BroadcastSummary, ObserverHub};
use crate::run::{Run, Transition};
use crate::source::SampleSource;

const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A monitor event kept for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub timestamp: String,
    pub event_type: MonitorEventType,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventType {
    PollerStarted,
    PollerStopped,
    RunStarted,
    RunAborted,
    RecordingStarted,
    RunFinalized,
    ObserversPruned,
    SourceUnavailable,
    SourceFatal,
    DispatchCompleted,
    DispatchFailed,
}

/// Counters and recent history of the poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerState {
    pub started_at: String,
    pub tick_count: u64,
    pub skipped_ticks: u64,
    pub last_tick_at: Option<String>,
    pub last_sample: Option<StateSample>,
    pub runs_finalized: u32,
    pub recent_events: VecDeque<MonitorEvent>,
}

impl Default for PollerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            tick_count: 0,
            skipped_ticks: 0,
            last_tick_at: None,
            last_sample: None,
            runs_finalized: 0,
            recent_events: VecDeque::with_capacity(MAX_RECENT_EVENTS),
        }
    }

    pub fn record_event(&mut self, event_type: MonitorEventType, detail: &str) {
        if self.recent_events.len() >= MAX_RECENT_EVENTS {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(MonitorEvent {
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            detail: detail.to_string(),
        });
    }

    pub fn events_of(&self, event_type: MonitorEventType) -> impl Iterator<Item = &MonitorEvent> {
        self.recent_events
            .iter()
            .filter(move |e| e.event_type == event_type)
    }
}

/// State shared by the poller thread and the command surface.
pub struct Shared {
    pub run: RwLock<Option<Run>>,
    pub hub: ObserverHub,
    pub state: Mutex<PollerState>,
}

impl Shared {
    pub fn new(backlog_max_points: usize) -> Self {
        Self {
            run: RwLock::new(None),
            hub: ObserverHub::new(backlog_max_points),
            state: Mutex::new(PollerState::new()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Core loop (synchronous, testable)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    Sampled,
    /// Transient source failure; retried next cadence.
    Skipped(String),
    /// Unrecoverable source failure; the loop must stop.
    Fatal(String),
}

/// Outcome of a single poll tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick_number: u64,
    pub status: TickStatus,
    /// `None` when there was no sample or no active run.
    pub transition: Option<Transition>,
    pub broadcast: BroadcastSummary,
    /// Snapshot of the run this tick finalized.
    pub finalized: Option<Run>,
}

/// Process one poll tick: read the source, feed the active run, broadcast.
pub fn process_tick(shared: &Shared, source: &dyn SampleSource) -> TickOutcome {
    let tick_number = {
        let mut state = shared.state();
        state.tick_count += 1;
        state.last_tick_at = Some(Utc::now().to_rfc3339());
        state.tick_count
    };

    let sample = match source.get_state() {
        Ok(sample) => sample,
        Err(e) => {
            let mut state = shared.state();
            let status = if e.is_fatal() {
                error!(tick = tick_number, error = %e, "sample source failed; stopping poller");
                state.record_event(MonitorEventType::SourceFatal, &e.to_string());
                TickStatus::Fatal(e.to_string())
            } else {
                warn!(tick = tick_number, error = %e, "sample source unavailable; tick skipped");
                state.skipped_ticks += 1;
                state.record_event(MonitorEventType::SourceUnavailable, &e.to_string());
                TickStatus::Skipped(e.to_string())
            };
            return TickOutcome {
                tick_number,
                status,
                transition: None,
                broadcast: BroadcastSummary::default(),
                finalized: None,
            };
        }
    };

    // The sequence number is taken under the run lock so a viewer attaching
    // concurrently either sees this sample in its backlog or live, never both.
    let (transition, finalized, seq) = {
        let mut guard = shared.run.write().unwrap_or_else(PoisonError::into_inner);
        let seq = shared.hub.next_seq();
        match guard.as_mut() {
            Some(run) => {
                let transition = run.observe(&sample);
                let finalized = (transition == Transition::Finalized).then(|| run.clone());
                (Some(transition), finalized, seq)
            }
            None => (None, None, seq),
        }
    };

    let broadcast = shared.hub.broadcast_at(seq, &sample.to_json());

    let mut state = shared.state();
    state.last_sample = Some(sample);
    match (&transition, &finalized) {
        (Some(Transition::RecordingStarted), _) => {
            info!(tick = tick_number, runtime = sample.runtime, "recording started");
            state.record_event(MonitorEventType::RecordingStarted, "first RUNNING sample");
        }
        (Some(Transition::Finalized), Some(run)) => {
            state.runs_finalized += 1;
            info!(
                tick = tick_number,
                run_id = %run.id,
                samples = run.samples.len(),
                state = sample.state.as_str(),
                "run finalized"
            );
            if !sample.state.is_terminal() {
                warn!(run_id = %run.id, state = sample.state.as_str(), "run ended without a terminal state");
            }
            state.record_event(
                MonitorEventType::RunFinalized,
                &format!(
                    "{} finalized with {} samples ({})",
                    run.id,
                    run.samples.len(),
                    sample.state
                ),
            );
        }
        _ => {}
    }
    if broadcast.removed > 0 {
        state.record_event(
            MonitorEventType::ObserversPruned,
            &format!("{} observer(s) removed", broadcast.removed),
        );
    }
    debug!(
        tick = tick_number,
        runtime = sample.runtime,
        temperature = sample.temperature,
        observers = broadcast.delivered,
        "tick"
    );

    TickOutcome {
        tick_number,
        status: TickStatus::Sampled,
        transition,
        broadcast,
        finalized,
    }
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// Why the poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerExit {
    Shutdown,
    Fatal(String),
}

/// Handle to a running poller thread. Dropping it also stops the loop.
pub struct PollerHandle {
    shutdown_tx: mpsc::Sender<()>,
    thread: JoinHandle<PollerExit>,
}

impl PollerHandle {
    /// Ask the loop to stop; it exits at its next wait.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> PollerExit {
        self.thread
            .join()
            .unwrap_or_else(|_| PollerExit::Fatal("poller thread panicked".to_string()))
    }
}

/// Run the poll loop on its own thread, handing each finalized run to
/// `on_finalize`.
pub fn spawn<F>(
    shared: Arc<Shared>,
    source: Arc<dyn SampleSource>,
    mut on_finalize: F,
) -> std::io::Result<PollerHandle>
where
    F: FnMut(Run) + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let thread = std::thread::Builder::new()
        .name("km-poller".to_string())
        .spawn(move || {
            let step = source.time_step();
            info!(time_step_ms = step.as_millis() as u64, "poller started");
            shared
                .state()
                .record_event(MonitorEventType::PollerStarted, "poller started");

            let exit = loop {
                let outcome = process_tick(&shared, source.as_ref());
                if let TickStatus::Fatal(reason) = outcome.status {
                    break PollerExit::Fatal(reason);
                }
                if let Some(run) = outcome.finalized {
                    on_finalize(run);
                }
                match shutdown_rx.recv_timeout(step) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break PollerExit::Shutdown,
                }
            };

            info!(exit = ?exit, "poller stopped");
            shared
                .state()
                .record_event(MonitorEventType::PollerStopped, &format!("{exit:?}"));
            exit
        })?;
    Ok(PollerHandle {
        shutdown_tx,
        thread,
    })
}
