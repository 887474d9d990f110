//! [`TaskSet`] — merged scheduling state for all tasks sharing a hash.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use takt_core::HandlerError;

use crate::task::{Handler, Task, TaskArgs};

/// Default backoff applied when the period multiset drains empty: the set
/// stays in the map but its next fire is pushed effectively forever into the
/// future. Overridable via `SchedulerSettings::dormant_backoff`.
pub const DORMANT_BACKOFF: Duration = Duration::from_secs(1 << 16);

/// Aggregates every [`Task`] sharing one grouping hash.
///
/// Tracks the multiset of requested periods and the single next absolute fire
/// time. Cadence is always `min(periods)`. The periods form a multiset, not a
/// set: the same numeric period added twice is two independent entries, so
/// removing one caller's instance does not clear the other's.
pub struct TaskSet {
    hash: String,
    handler: Arc<dyn Handler>,
    args: TaskArgs,
    periods: Vec<Duration>,
    next_event: Instant,
}

impl TaskSet {
    /// Seed a new set from its first task. Fires promptly: `next_event = now`.
    pub fn new(task: &Task, now: Instant) -> Self {
        Self {
            hash: task.hash().to_string(),
            handler: Arc::clone(task.handler()),
            args: task.args().clone(),
            periods: vec![task.period()],
            next_event: now,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn next_event(&self) -> Instant {
        self.next_event
    }

    /// Current effective cadence, `None` when dormant.
    pub fn cadence(&self) -> Option<Duration> {
        self.periods.iter().min().copied()
    }

    /// Number of period entries currently in the multiset.
    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    /// Whether this set is due at `now`.
    pub fn in_time(&self, now: Instant) -> bool {
        self.next_event <= now
    }

    /// Advance the next fire time after an execution. A drained set goes
    /// dormant for `dormant_backoff` rather than being removed from the map.
    pub fn update_event(&mut self, now: Instant, dormant_backoff: Duration) {
        match self.cadence() {
            Some(cadence) => self.next_event += cadence,
            None => self.next_event = now + dormant_backoff,
        }
    }

    /// Add one period entry. Returns true when the set's timing must be
    /// recomputed: either this is the first period (the set was dormant, so
    /// `next_event` resets to `now` and the set fires promptly) or the new
    /// period is at or below the previous minimum (so `next_event` is pulled
    /// in to at most `now + period` — sooner than previously planned, but
    /// without an extra fire for a set already on schedule).
    pub fn add_period(&mut self, period: Duration, now: Instant) -> bool {
        let needs_reschedule = match self.cadence() {
            None => {
                self.next_event = now;
                true
            }
            Some(min) if period <= min => {
                self.next_event = self.next_event.min(now + period);
                true
            }
            Some(_) => false,
        };
        self.periods.push(period);
        needs_reschedule
    }

    /// Remove exactly one instance of `period` from the multiset. Returns
    /// false (no state change) when absent; otherwise true iff the removed
    /// value was the current minimum, meaning the planned next fire may now
    /// be stale. `next_event` is deliberately not recomputed here — the next
    /// scheduler tick settles it via `in_time`/`update_event`.
    pub fn remove_period(&mut self, period: Duration) -> bool {
        let Some(pos) = self.periods.iter().position(|p| *p == period) else {
            return false;
        };
        let was_min = self.cadence() == Some(period);
        self.periods.remove(pos);
        if self.periods.is_empty() {
            debug!(hash = %self.hash, "task set drained, going dormant");
        }
        was_min
    }

    /// Replace handler/args with those of the task whose period triggered the
    /// current mutation. Callers sharing a hash are expected to pass the same
    /// handler/args; this is not enforced.
    pub(crate) fn adopt(&mut self, task: &Task) {
        self.handler = Arc::clone(task.handler());
        self.args = task.args().clone();
    }

    /// Invoke the handler synchronously with this set's args.
    pub(crate) fn execute(&self) -> Result<(), HandlerError> {
        self.handler.call(&self.args)
    }
}
