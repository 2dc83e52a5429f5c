//! Live viewer fan-out.
//!
//! The hub keeps weak references only: a viewer lives as long as its
//! connection handler holds the `Arc`. Broadcasts iterate a snapshot of the
//! registry and reconcile removals afterwards, so attach and detach never
//! contend with an in-flight send loop. A failed send is a permanent
//! disconnect; there are no retries and no send timeouts, so a viewer whose
//! send blocks without erroring stalls that one broadcast.
//!
//! Attaching is split in two. [`ObserverHub::reserve`] registers the viewer
//! with a queue; [`ObserverHub::complete`] sends the backlog and drains the
//! queue. A slow backlog send therefore holds up only its own viewer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use km_common::{BacklogMessage, StateSample};

/// Default cap on samples replayed to a new viewer.
pub const DEFAULT_BACKLOG_MAX_POINTS: usize = 50;

/// Result of one send to one observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed(String),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// A message sink, typically one viewer connection.
pub trait Observer: Send + Sync {
    fn send(&self, message: &str) -> SendOutcome;

    /// Short label for logs.
    fn label(&self) -> String {
        "observer".to_string()
    }
}

struct Entry {
    id: u64,
    observer: Weak<dyn Observer>,
    /// Broadcasts at or below this sequence were covered by the backlog.
    since: u64,
    /// Live messages held back while the backlog is still being sent.
    pending: Option<Vec<String>>,
}

/// Registration made before the backlog is sent; see [`ObserverHub::reserve`].
#[derive(Debug)]
#[must_use = "a reservation queues messages until it is completed"]
pub struct Reservation {
    id: u64,
}

/// Counts from one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub delivered: usize,
    pub removed: usize,
}

/// Registry of live viewers.
pub struct ObserverHub {
    entries: Mutex<Vec<Entry>>,
    /// Serializes broadcasts against each other.
    broadcast_gate: Mutex<()>,
    next_id: AtomicU64,
    seq: AtomicU64,
    backlog_max_points: usize,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_MAX_POINTS)
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("observers", &self.len())
            .field("backlog_max_points", &self.backlog_max_points)
            .finish()
    }
}

impl ObserverHub {
    pub fn new(backlog_max_points: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            broadcast_gate: Mutex::new(()),
            next_id: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            backlog_max_points,
        }
    }

    pub fn backlog_max_points(&self) -> usize {
        self.backlog_max_points
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered observers, including ones already dropped by
    /// their owner but not yet pruned.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number for the next broadcast.
    ///
    /// Callers that build backlogs from shared state take this under the
    /// same lock the backlog is read under.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register `observer` ahead of its backlog.
    ///
    /// Broadcasts numbered after this call are queued for the observer until
    /// [`ObserverHub::complete`] has sent the backlog. Take the reservation
    /// while the backlog's source is locked, then send outside that lock.
    pub fn reserve(&self, observer: &Arc<dyn Observer>) -> Reservation {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let since = self.seq.load(Ordering::SeqCst);
        self.entries().push(Entry {
            id,
            observer: Arc::downgrade(observer),
            since,
            pending: Some(Vec::new()),
        });
        Reservation { id }
    }

    /// Send `backlog`, then whatever was queued meanwhile, then go live.
    ///
    /// A failed send drops the registration. An observer detached while its
    /// backlog was in flight stays detached.
    pub fn complete(
        &self,
        reservation: Reservation,
        observer: &Arc<dyn Observer>,
        backlog: &BacklogMessage,
    ) -> SendOutcome {
        let id = reservation.id;
        let payload = match backlog.to_json() {
            Ok(p) => p,
            Err(e) => {
                self.remove(id);
                return SendOutcome::Failed(format!("backlog encoding failed: {e}"));
            }
        };
        if let SendOutcome::Failed(reason) = observer.send(&payload) {
            self.remove(id);
            warn!(observer = %observer.label(), reason = %reason, "backlog send failed, observer not registered");
            return SendOutcome::Failed(reason);
        }

        let mut flushed = 0;
        loop {
            let queued = {
                let mut entries = self.entries();
                let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
                    return SendOutcome::Sent;
                };
                match entry.pending.as_mut() {
                    Some(queue) if !queue.is_empty() => std::mem::take(queue),
                    _ => {
                        entry.pending = None;
                        break;
                    }
                }
            };
            for message in queued {
                if let SendOutcome::Failed(reason) = observer.send(&message) {
                    self.remove(id);
                    warn!(observer = %observer.label(), reason = %reason, "send failed, removing observer");
                    return SendOutcome::Failed(reason);
                }
                flushed += 1;
            }
        }
        debug!(
            observer = %observer.label(),
            id,
            backlog = backlog.log.len(),
            flushed,
            "observer attached"
        );
        SendOutcome::Sent
    }

    /// Send `backlog` to `observer` and register it if that send succeeded.
    pub fn attach(&self, observer: &Arc<dyn Observer>, backlog: &BacklogMessage) -> SendOutcome {
        let reservation = self.reserve(observer);
        self.complete(reservation, observer, backlog)
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|e| e.id != id);
    }

    /// Remove `observer`. Returns whether it was registered.
    pub fn detach(&self, observer: &Arc<dyn Observer>) -> bool {
        let target = Arc::as_ptr(observer);
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| !std::ptr::addr_eq(e.observer.as_ptr(), target));
        before != entries.len()
    }

    /// Deliver one sample to every registered observer.
    pub fn broadcast(&self, sample: &StateSample) -> BroadcastSummary {
        self.broadcast_at(self.next_seq(), &sample.to_json())
    }

    /// Deliver message number `seq` to every registered observer whose
    /// backlog did not already cover it.
    pub fn broadcast_at(&self, seq: u64, message: &str) -> BroadcastSummary {
        let _gate = self
            .broadcast_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let snapshot: Vec<(u64, Weak<dyn Observer>)> = {
            let mut entries = self.entries();
            let mut live = Vec::with_capacity(entries.len());
            for entry in entries.iter_mut().filter(|e| seq > e.since) {
                match entry.pending.as_mut() {
                    Some(queue) => queue.push(message.to_string()),
                    None => live.push((entry.id, entry.observer.clone())),
                }
            }
            live
        };

        let mut summary = BroadcastSummary::default();
        let mut failed = HashSet::new();
        for (id, weak) in snapshot {
            let Some(observer) = weak.upgrade() else {
                failed.insert(id);
                continue;
            };
            match observer.send(message) {
                SendOutcome::Sent => summary.delivered += 1,
                SendOutcome::Failed(reason) => {
                    warn!(observer = %observer.label(), id, reason = %reason, "send failed, removing observer");
                    failed.insert(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|e| !failed.contains(&e.id));
            summary.removed = before - entries.len();
        }
        summary
    }
}

/// Evenly strided subsample of `samples` holding at most `max_points`.
///
/// Keeps temporal order and always starts with the first sample. The stride
/// is `⌊N/(max_points-1)⌋`, raised to `⌈N/max_points⌉` where that alone
/// would overshoot the cap.
pub fn backlog_subset(samples: &[StateSample], max_points: usize) -> Vec<StateSample> {
    let n = samples.len();
    if n <= max_points {
        return samples.to_vec();
    }
    match max_points {
        0 => Vec::new(),
        1 => vec![samples[0]],
        _ => {
            let stride = (n / (max_points - 1)).max(n.div_ceil(max_points));
            samples.iter().step_by(stride).copied().collect()
        }
    }
}
