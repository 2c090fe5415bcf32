use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// What kind of named activity is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Dance,
    Reaction,
    BodyAction,
    Behavior,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dance => "dance",
            Self::Reaction => "reaction",
            Self::BodyAction => "body action",
            Self::Behavior => "behavior",
        }
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    kind: ActivityKind,
    id: String,
    behavior: String,
}

/// Activities currently running on the robot.
///
/// Entries are only added through [`InFlight::track`]; the returned guard
/// removes its own entry when dropped, so a call that fails, panics or is
/// cancelled never leaves a stale entry behind.
#[derive(Debug, Default)]
pub struct InFlight {
    entries: Mutex<Vec<Entry>>,
    next_seq: AtomicU64,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn track(
        self: &Arc<Self>,
        kind: ActivityKind,
        id: impl Into<String>,
        behavior: impl Into<String>,
    ) -> InFlightGuard {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(Entry {
            seq,
            kind,
            id: id.into(),
            behavior: behavior.into(),
        });
        InFlightGuard {
            set: Arc::clone(self),
            seq,
        }
    }

    pub fn is_running(&self, kind: ActivityKind, id: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| e.kind == kind && e.id == id)
    }

    /// Behavior name of the most recently started activity with this id.
    pub fn behavior_for(&self, kind: ActivityKind, id: &str) -> Option<String> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.kind == kind && e.id == id)
            .map(|e| e.behavior.clone())
    }

    /// Sorted, de-duplicated ids of running activities of one kind.
    pub fn running(&self, kind: ActivityKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Removes its entry from the owning [`InFlight`] on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlight>,
    seq: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut entries = self.set.entries.lock();
        if let Some(pos) = entries.iter().position(|e| e.seq == self.seq) {
            entries.remove(pos);
        }
    }
}
