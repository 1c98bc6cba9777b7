use crate::model::{BackendResult, Contestant};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// In-memory progress of one suggestion's run.
///
/// The contestant set is fixed at creation. Backend tasks record their
/// completed rows here; readiness flips once, when the last contestant lands.
#[derive(Debug)]
pub struct Competition {
    suggestion_id: i64,
    /// Contestant slots in display-position order.
    slots: Vec<Slot>,
    state: Mutex<CompetitionState>,
    settled: AtomicBool,
}

#[derive(Debug, Clone)]
struct Slot {
    position: u32,
    result_id: i64,
    backend_name: String,
}

#[derive(Debug, Default)]
struct CompetitionState {
    completed: HashMap<String, BackendResult>,
    ready: bool,
    snapshot: Option<Vec<Contestant>>,
}

/// A consistent read of a competition, taken under its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub completed_count: usize,
    pub total_contestants: usize,
    pub ready: bool,
    /// Contestant results in display order, present once ready.
    pub snapshot: Option<Vec<Contestant>>,
}

impl Competition {
    /// `contestants` are in display order; `seeded` are rows already completed
    /// (non-empty only when resuming an interrupted run).
    pub fn new(
        suggestion_id: i64,
        contestants: &[BackendResult],
        seeded: impl IntoIterator<Item = BackendResult>,
    ) -> Self {
        let slots = contestants
            .iter()
            .enumerate()
            .map(|(pos, r)| Slot {
                position: pos as u32,
                result_id: r.id,
                backend_name: r.backend_name.clone(),
            })
            .collect();

        let mut state = CompetitionState::default();
        for r in seeded.into_iter().filter(|r| r.is_completed()) {
            state.completed.insert(r.backend_name.clone(), r);
        }

        let competition = Self {
            suggestion_id,
            slots,
            state: Mutex::new(state),
            settled: AtomicBool::new(false),
        };
        {
            let mut st = competition.lock();
            competition.try_flip(&mut st);
        }
        competition
    }

    fn lock(&self) -> MutexGuard<'_, CompetitionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn suggestion_id(&self) -> i64 {
        self.suggestion_id
    }

    pub fn contestant_ids(&self) -> Vec<i64> {
        self.slots.iter().map(|s| s.result_id).collect()
    }

    pub fn is_contestant(&self, backend_name: &str) -> bool {
        self.slots.iter().any(|s| s.backend_name == backend_name)
    }

    /// Stores a completed row. Returns true when this call made the
    /// competition ready. Pending rows and repeats for a backend are ignored.
    pub fn record(&self, result: BackendResult) -> bool {
        if !result.is_completed() {
            return false;
        }
        let mut st = self.lock();
        st.completed
            .entry(result.backend_name.clone())
            .or_insert(result);
        self.try_flip(&mut st)
    }

    fn try_flip(&self, st: &mut CompetitionState) -> bool {
        if st.ready {
            return false;
        }
        let mut snapshot = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match st.completed.get(&slot.backend_name) {
                Some(r) => snapshot.push(Contestant {
                    position: slot.position,
                    result: r.clone(),
                }),
                None => return false,
            }
        }
        st.snapshot = Some(snapshot);
        st.ready = true;
        true
    }

    pub fn progress(&self) -> Progress {
        let st = self.lock();
        Progress {
            completed_count: self
                .slots
                .iter()
                .filter(|s| st.completed.contains_key(&s.backend_name))
                .count(),
            total_contestants: self.slots.len(),
            ready: st.ready,
            snapshot: st.snapshot.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.store(true, Ordering::SeqCst);
    }

    /// True once every dispatched backend of the run has returned.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}
