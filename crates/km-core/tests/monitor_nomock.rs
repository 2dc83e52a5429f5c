//! No-mock monitor tests.
//!
//! Drives the real poller thread against the simulated kiln, with records
//! and notifications written to a temp directory.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use km_common::{FiringState, Profile, StateSample};
use km_core::config::MonitorConfig;
use km_core::dispatch::{DispatchOutcome, ReportDispatcher};
use km_core::hub::{Observer, SendOutcome};
use km_core::monitor::Monitor;
use km_core::notify::OutboxNotifier;
use km_core::poller::{MonitorEventType, PollerExit};
use km_core::simulator::{SimulatedKiln, ThermalParams};
use km_record::RecordStore;
use tempfile::TempDir;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Default)]
struct Viewer {
    messages: Mutex<Vec<String>>,
    /// Fail every send once this many messages were accepted.
    fail_after: Option<usize>,
    closed: AtomicBool,
}

impl Viewer {
    fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Default::default()
        }
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Observer for Viewer {
    fn send(&self, message: &str) -> SendOutcome {
        let mut messages = self.messages.lock().unwrap();
        if self.fail_after.is_some_and(|n| messages.len() >= n) {
            self.closed.store(true, Ordering::SeqCst);
            return SendOutcome::Failed("connection reset".into());
        }
        messages.push(message.to_string());
        SendOutcome::Sent
    }
}

fn monitor(dir: &TempDir) -> Monitor {
    let mut config = MonitorConfig::default();
    config.storage_dir = dir.path().join("history");
    let kiln = Arc::new(SimulatedKiln::new(ThermalParams::default(), 10.0, 10_000.0));
    let dispatcher = ReportDispatcher::new(
        RecordStore::new(&config.storage_dir),
        Arc::new(OutboxNotifier::new(dir.path().join("outbox"))),
    );
    Monitor::new(&config, kiln.clone(), kiln, dispatcher)
}

fn short_profile() -> Profile {
    Profile::new("short", vec![[0.0, 80.0], [300.0, 300.0], [600.0, 300.0]])
}

#[test]
fn simulated_firing_is_recorded_streamed_and_reported() {
    let dir = TempDir::new().unwrap();
    let m = monitor(&dir);
    m.start_run(short_profile(), 0.0, vec!["studio@example.org".into()])
        .unwrap();

    let healthy = Arc::new(Viewer::default());
    let flaky = Arc::new(Viewer::failing_after(5));
    let healthy_obs: Arc<dyn Observer> = healthy.clone();
    let flaky_obs: Arc<dyn Observer> = flaky.clone();
    assert!(m.attach_observer(&healthy_obs).is_sent());
    assert!(m.attach_observer(&flaky_obs).is_sent());

    let handle = m.spawn().unwrap();
    let report = m.wait_for_dispatch(DISPATCH_TIMEOUT).expect("run dispatched");
    handle.shutdown();
    assert_eq!(handle.join(), PollerExit::Shutdown);

    let stored = match report.result.expect("dispatch succeeded") {
        DispatchOutcome::Delivered { stored, summary } => {
            assert_eq!(summary.recipients, 1);
            stored
        }
        other => panic!("expected delivery, got {other:?}"),
    };

    let run = m.current_run().unwrap();
    assert_eq!(run.id, report.run_id);
    assert!(run.is_finalized());
    let record = RecordStore::load(&stored.path).unwrap();
    assert_eq!(record.samples, run.samples);
    assert!(record.samples.iter().skip(1).all(|s| s.state == FiringState::Running));
    assert!(record.samples.windows(2).all(|w| w[0].runtime <= w[1].runtime));

    // The flaky viewer got exactly its quota and was pruned.
    assert!(flaky.closed.load(Ordering::SeqCst));
    assert_eq!(flaky.messages().len(), 5);
    assert_eq!(m.observer_count(), 1);

    // The healthy viewer saw the backlog, then every sample in order.
    let messages = healthy.messages();
    assert!(messages[0].contains(r#""type":"backlog""#));
    let live: Vec<StateSample> = messages[1..]
        .iter()
        .map(|m| serde_json::from_str(m).unwrap())
        .collect();
    assert!(live.iter().any(|s| s.state == FiringState::Complete));
    assert!(live.windows(2).all(|w| w[0].runtime <= w[1].runtime));

    let state = m.poller_state();
    assert_eq!(state.runs_finalized, 1);
    assert_eq!(state.events_of(MonitorEventType::DispatchCompleted).count(), 1);
}

#[test]
fn abort_finalizes_and_archives_run() {
    let dir = TempDir::new().unwrap();
    let m = monitor(&dir);
    let long = Profile::new("long", vec![[0.0, 80.0], [36_000.0, 2000.0]]);
    m.start_run(long, 0.0, vec![]).unwrap();
    let handle = m.spawn().unwrap();

    while m.current_run().map(|r| r.samples.len()).unwrap_or(0) < 10 {
        std::thread::sleep(Duration::from_millis(2));
    }
    m.abort_run().unwrap();

    let report = m.wait_for_dispatch(DISPATCH_TIMEOUT).expect("run dispatched");
    handle.shutdown();
    handle.join();

    let outcome = report.result.expect("archived");
    assert!(matches!(outcome, DispatchOutcome::Archived(_)));
    let record = RecordStore::load(&outcome.stored().path).unwrap();
    assert!(!record.recording);
    assert!(record.samples.len() >= 10);
    assert!(!dir.path().join("outbox").exists());

    let state = m.poller_state();
    assert_eq!(state.events_of(MonitorEventType::RunAborted).count(), 1);
    assert_eq!(state.events_of(MonitorEventType::RunFinalized).count(), 1);
}

#[test]
fn abort_right_after_start_still_archives_run() {
    let dir = TempDir::new().unwrap();
    let m = monitor(&dir);
    m.start_run(short_profile(), 0.0, vec![]).unwrap();
    m.abort_run().unwrap();
    let handle = m.spawn().unwrap();

    let report = m.wait_for_dispatch(DISPATCH_TIMEOUT).expect("run dispatched");
    handle.shutdown();
    handle.join();

    let outcome = report.result.expect("archived");
    assert!(matches!(outcome, DispatchOutcome::Archived(_)));
    let record = RecordStore::load(&outcome.stored().path).unwrap();
    assert!(!record.recording);
    assert_eq!(record.samples.len(), 1);
    assert_eq!(record.samples[0].state, FiringState::Running);
}

/// Accepts every message, but its first send blocks for `delay`.
struct SlowViewer {
    delay: Duration,
    in_send: AtomicBool,
    messages: Mutex<Vec<String>>,
}

impl Observer for SlowViewer {
    fn send(&self, message: &str) -> SendOutcome {
        if !self.in_send.swap(true, Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.messages.lock().unwrap().push(message.to_string());
        SendOutcome::Sent
    }
}

#[test]
fn slow_viewer_does_not_stall_recording() {
    let dir = TempDir::new().unwrap();
    let m = Arc::new(monitor(&dir));
    let long = Profile::new("long", vec![[0.0, 80.0], [36_000.0, 2000.0]]);
    m.start_run(long, 0.0, vec![]).unwrap();
    let handle = m.spawn().unwrap();
    let recorded = |m: &Monitor| m.current_run().map(|r| r.samples.len()).unwrap_or(0);
    while recorded(&m) < 5 {
        std::thread::sleep(Duration::from_millis(1));
    }

    let slow = Arc::new(SlowViewer {
        delay: Duration::from_millis(600),
        in_send: AtomicBool::new(false),
        messages: Mutex::new(Vec::new()),
    });
    let attach = {
        let m = Arc::clone(&m);
        let viewer: Arc<dyn Observer> = slow.clone();
        std::thread::spawn(move || {
            let outcome = m.attach_observer(&viewer);
            (outcome, viewer)
        })
    };
    while !slow.in_send.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(1));
    }
    let before = recorded(&m);
    std::thread::sleep(Duration::from_millis(100));
    assert!(!attach.is_finished());
    assert!(recorded(&m) > before, "poller kept recording during the backlog send");

    let (outcome, _viewer) = attach.join().unwrap();
    assert!(outcome.is_sent());
    std::thread::sleep(Duration::from_millis(20));
    m.abort_run().unwrap();
    m.wait_for_dispatch(DISPATCH_TIMEOUT).expect("run dispatched");
    handle.shutdown();
    handle.join();

    let messages = slow.messages.lock().unwrap().clone();
    let backlog: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
    assert_eq!(backlog["type"], "backlog");
    let backlog_end = backlog["log"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["runtime"].as_f64().unwrap())
        .fold(f64::MIN, f64::max);
    let running: Vec<f64> = messages[1..]
        .iter()
        .map(|m| serde_json::from_str::<StateSample>(m).unwrap())
        .filter(|s| s.state == FiringState::Running)
        .map(|s| s.runtime)
        .collect();
    // Samples queued during the backlog send follow it, each exactly once.
    assert!(!running.is_empty());
    assert!(running[0] > backlog_end);
    assert!(running.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn viewers_come_and_go_during_a_run() {
    let dir = TempDir::new().unwrap();
    let m = Arc::new(monitor(&dir));
    let long = Profile::new("long", vec![[0.0, 80.0], [36_000.0, 2000.0]]);
    m.start_run(long, 0.0, vec![]).unwrap();
    let handle = m.spawn().unwrap();

    let attached = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            let attached = Arc::clone(&attached);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let viewer: Arc<dyn Observer> = Arc::new(Viewer::default());
                    if m.attach_observer(&viewer).is_sent() {
                        attached.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                    m.detach_observer(&viewer);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let keeper = Arc::new(Viewer::default());
    let keeper_obs: Arc<dyn Observer> = keeper.clone();
    m.attach_observer(&keeper_obs);
    std::thread::sleep(Duration::from_millis(20));
    m.abort_run().unwrap();
    m.wait_for_dispatch(DISPATCH_TIMEOUT).expect("run dispatched");
    handle.shutdown();
    handle.join();

    assert_eq!(attached.load(Ordering::SeqCst), 100);
    assert_eq!(m.observer_count(), 1);
    // Backlog plus at least one live sample after attaching.
    assert!(keeper.messages().len() >= 2);
}
