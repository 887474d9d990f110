//! [`TaskMap`] — the scheduler's authoritative hash → [`TaskSet`] registry.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::set::TaskSet;
use crate::task::Task;

/// Registry of task sets, keyed by grouping hash.
///
/// Owned exclusively by the scheduler loop; all mutation arrives through the
/// pending add/remove queues drained on the owning thread, so the map itself
/// needs no locking. Entries are created on first sight of a hash and never
/// physically removed — a drained set merely goes dormant (see
/// [`DORMANT_BACKOFF`](crate::DORMANT_BACKOFF)), which keeps hash reuse free
/// of create/destroy races.
#[derive(Default)]
pub struct TaskMap {
    sets: HashMap<String, TaskSet>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a task into the registry. Returns true when the scheduler must
    /// recompute timers: always for an unseen hash, otherwise whatever
    /// [`TaskSet::add_period`] reports.
    pub fn add_task(&mut self, task: &Task, now: Instant) -> bool {
        match self.sets.get_mut(task.hash()) {
            Some(set) => {
                set.adopt(task);
                set.add_period(task.period(), now)
            }
            None => {
                debug!(hash = %task.hash(), period = ?task.period(), "new task set");
                self.sets
                    .insert(task.hash().to_string(), TaskSet::new(task, now));
                true
            }
        }
    }

    /// Remove one period instance for the task's hash. Unknown hashes and
    /// unknown periods are silent no-ops — removal is idempotent.
    pub fn remove_task(&mut self, task: &Task) -> bool {
        match self.sets.get_mut(task.hash()) {
            Some(set) => set.remove_period(task.period()),
            None => false,
        }
    }

    /// Snapshot of all task sets. Order is unspecified and carries no
    /// meaning: tie-breaks among simultaneously-due sets are undefined.
    pub fn get_list(&self) -> Vec<&TaskSet> {
        self.sets.values().collect()
    }

    pub fn get(&self, hash: &str) -> Option<&TaskSet> {
        self.sets.get(hash)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub(crate) fn sets_mut(&mut self) -> impl Iterator<Item = &mut TaskSet> {
        self.sets.values_mut()
    }
}
