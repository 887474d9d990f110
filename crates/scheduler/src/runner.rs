//! [`Scheduler`] — the background loop that owns a [`TaskMap`] and fires due
//! task sets.
//!
//! The loop is intentionally single-threaded: all due handlers for a tick run
//! sequentially on the scheduler's own thread, which keeps the timer
//! bookkeeping race-free without per-task locks. The cost is head-of-line
//! blocking when a handler runs long; that is a documented limitation, not a
//! defect. A handler that returns an error or panics is fatal: the failure is
//! sent over the crash channel and the loop exits (fail-stop, not
//! fail-recover).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, error, info};

use takt_core::{panic_message, SchedulerSettings, TaktError};

use crate::map::TaskMap;
use crate::metrics::SchedulerMetrics;
use crate::task::Task;

enum Op {
    Add(Task),
    Remove(Task),
}

/// Handle to the scheduler loop. Cheap to clone; all clones share the same
/// pending queue, wake signal, and liveness flag.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    /// Pending add/remove requests, applied at the top of each iteration.
    /// This mutex is held only during queue access, never during handler
    /// execution.
    pending: Mutex<Vec<Op>>,
    /// Wakes the loop out of its bounded sleep when the queue changes.
    wake: Condvar,
    /// Shared liveness flag: cleared by `stop()` or by the owning client.
    alive: Arc<AtomicBool>,
    metrics: RwLock<SchedulerMetrics>,
    settings: SchedulerSettings,
}

impl Scheduler {
    /// Create a scheduler sharing the given liveness flag. The loop does not
    /// start until [`run`](Scheduler::run) is called on a dedicated thread.
    pub fn new(settings: SchedulerSettings, alive: Arc<AtomicBool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(Vec::new()),
                wake: Condvar::new(),
                alive,
                metrics: RwLock::new(SchedulerMetrics::default()),
                settings,
            }),
        }
    }

    /// Queue a task for scheduling and wake the loop, so a newly added
    /// high-frequency task is picked up immediately instead of waiting out a
    /// stale, longer sleep. Never blocks on handler execution.
    pub fn schedule(&self, task: Task) {
        debug!(hash = %task.hash(), period = ?task.period(), "queueing schedule request");
        self.push_op(Op::Add(task));
    }

    /// Queue a task for removal and wake the loop. Best-effort and
    /// asynchronous: an invocation already in progress is not cancelled, only
    /// future ones are prevented. Unknown hashes/periods are silent no-ops.
    pub fn unschedule(&self, task: Task) {
        debug!(hash = %task.hash(), period = ?task.period(), "queueing unschedule request");
        self.push_op(Op::Remove(task));
    }

    /// Clear the liveness flag; the loop exits after its current iteration.
    pub fn stop(&self) {
        info!("scheduler stop requested");
        let _pending = self.inner.pending.lock().unwrap();
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.wake.notify_all();
    }

    /// Whether the liveness flag is still set.
    pub fn is_running(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Snapshot of the current metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.inner.metrics.read().unwrap().clone()
    }

    fn push_op(&self, op: Op) {
        let mut pending = self.inner.pending.lock().unwrap();
        pending.push(op);
        self.inner.wake.notify_all();
    }

    /// Run the scheduling loop. Blocks until the liveness flag clears or a
    /// handler fault stops the loop; call on a dedicated thread.
    ///
    /// Terminal handler faults are sent over `crash_tx` before the loop
    /// exits, instead of relying on any process-wide hook.
    pub fn run(&self, crash_tx: Sender<TaktError>) {
        let mut map = TaskMap::new();
        info!("scheduler loop started");

        while self.inner.alive.load(Ordering::SeqCst) {
            self.drain_pending(&mut map);

            let near_event = match self.tick(&mut map, &crash_tx) {
                Ok(near) => near,
                Err(()) => break,
            };

            let now = Instant::now();
            let timeout = match near_event {
                Some(at) => at.saturating_duration_since(now),
                None => self.inner.settings.idle_poll(),
            };

            // Bounded wait, pre-empted by schedule/unschedule/stop. The
            // liveness and emptiness checks happen under the queue mutex, so
            // a wake between check and wait cannot be lost.
            let pending = self.inner.pending.lock().unwrap();
            if pending.is_empty() && self.inner.alive.load(Ordering::SeqCst) {
                let _unused = self.inner.wake.wait_timeout(pending, timeout).unwrap();
            }
        }

        info!("scheduler loop stopped");
    }

    /// Apply queued add/remove requests to the map. The queue mutex is
    /// released before any handler runs.
    fn drain_pending(&self, map: &mut TaskMap) {
        let ops = std::mem::take(&mut *self.inner.pending.lock().unwrap());
        if ops.is_empty() {
            return;
        }

        let now = Instant::now();
        for op in ops {
            match op {
                Op::Add(task) => {
                    let reschedule = map.add_task(&task, now);
                    debug!(hash = %task.hash(), reschedule, "applied add");
                }
                Op::Remove(task) => {
                    let removed_min = map.remove_task(&task);
                    debug!(hash = %task.hash(), removed_min, "applied remove");
                }
            }
        }
    }

    /// Execute every due task set and return the nearest next fire time.
    /// Execution order among simultaneously-due sets is unspecified.
    fn tick(&self, map: &mut TaskMap, crash_tx: &Sender<TaktError>) -> Result<Option<Instant>, ()> {
        let now = Instant::now();
        let dormant_backoff = self.inner.settings.dormant_backoff();
        let mut near_event: Option<Instant> = None;

        for set in map.sets_mut() {
            if set.in_time(now) && set.cadence().is_none() {
                // Drained set with a stale next_event: settle it into
                // dormancy without firing.
                debug!(hash = %set.hash(), "settling dormant task set");
                set.update_event(now, dormant_backoff);
            } else if set.in_time(now) {
                debug!(hash = %set.hash(), "task set due");
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| set.execute()));

                match outcome {
                    Ok(Ok(())) => {
                        let elapsed = started.elapsed();
                        self.inner
                            .metrics
                            .write()
                            .unwrap()
                            .record_execution(set.hash(), elapsed);
                    }
                    Ok(Err(e)) => {
                        let err = TaktError::HandlerFailed {
                            hash: set.hash().to_string(),
                            message: e.to_string(),
                        };
                        self.fail(err, crash_tx);
                        return Err(());
                    }
                    Err(payload) => {
                        let err = TaktError::HandlerPanicked {
                            hash: set.hash().to_string(),
                            message: panic_message(payload.as_ref()),
                        };
                        self.fail(err, crash_tx);
                        return Err(());
                    }
                }

                set.update_event(Instant::now(), dormant_backoff);
            }

            near_event = Some(match near_event {
                Some(near) => near.min(set.next_event()),
                None => set.next_event(),
            });
        }

        self.inner.metrics.write().unwrap().record_tick();
        Ok(near_event)
    }

    /// Fail-stop: clear liveness and report the terminal fault.
    fn fail(&self, err: TaktError, crash_tx: &Sender<TaktError>) {
        error!(error = %err, "handler fault, stopping scheduler");
        self.inner.alive.store(false, Ordering::SeqCst);
        let _ = crash_tx.send(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Handler, TaskArgs};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::{self, Receiver};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    struct Harness {
        scheduler: Scheduler,
        alive: Arc<AtomicBool>,
        crash_rx: Receiver<TaktError>,
        handle: JoinHandle<()>,
    }

    fn start_scheduler() -> Harness {
        let alive = Arc::new(AtomicBool::new(true));
        let scheduler = Scheduler::new(SchedulerSettings::default(), Arc::clone(&alive));
        let (crash_tx, crash_rx) = mpsc::channel();
        let runner = scheduler.clone();
        let handle = thread::spawn(move || runner.run(crash_tx));
        Harness {
            scheduler,
            alive,
            crash_rx,
            handle,
        }
    }

    fn counting_task(period: Duration, hash: &str, count: Arc<AtomicUsize>) -> Task {
        Task::with_hash(
            Arc::new(move |_: &TaskArgs| -> Result<(), takt_core::HandlerError> {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }) as Arc<dyn Handler>,
            vec![],
            period,
            hash,
        )
    }

    #[test]
    fn schedule_does_not_execute_on_caller_thread() {
        let alive = Arc::new(AtomicBool::new(true));
        let scheduler = Scheduler::new(SchedulerSettings::default(), alive);
        let count = Arc::new(AtomicUsize::new(0));

        // Loop not running: the request only sits in the pending queue.
        scheduler.schedule(counting_task(
            Duration::from_millis(500),
            "H",
            Arc::clone(&count),
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_fire_then_period_cadence() {
        let h = start_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let seen_args = Arc::new(Mutex::new(Vec::new()));

        let c = Arc::clone(&count);
        let seen = Arc::clone(&seen_args);
        let task = Task::with_hash(
            Arc::new(move |args: &TaskArgs| -> Result<(), takt_core::HandlerError> {
                c.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(args.clone());
                Ok(())
            }) as Arc<dyn Handler>,
            vec![json!("a"), json!(1)],
            Duration::from_millis(500),
            "H",
        );
        h.scheduler.schedule(task);

        // A fresh set fires promptly, then waits out its full period.
        thread::sleep(Duration::from_millis(480));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(seen_args.lock().unwrap()[0], vec![json!("a"), json!(1)]);

        h.scheduler.stop();
        h.handle.join().unwrap();
    }

    #[test]
    fn merged_hash_fires_at_min_cadence() {
        let h = start_scheduler();
        let count = Arc::new(AtomicUsize::new(0));

        h.scheduler.schedule(counting_task(
            Duration::from_millis(500),
            "H",
            Arc::clone(&count),
        ));
        h.scheduler.schedule(counting_task(
            Duration::from_millis(200),
            "H",
            Arc::clone(&count),
        ));

        thread::sleep(Duration::from_millis(1050));
        let fired = count.load(Ordering::SeqCst);
        // 500ms cadence alone would allow at most 3 fires in this window.
        assert!(fired >= 4, "expected ≥4 fires at 200ms cadence, got {fired}");

        h.scheduler.stop();
        h.handle.join().unwrap();
    }

    #[test]
    fn schedule_preempts_a_long_sleep() {
        let h = start_scheduler();
        let slow = Arc::new(AtomicUsize::new(0));
        let fast = Arc::new(AtomicUsize::new(0));

        // Park the loop in a ten-second sleep after the first fire.
        h.scheduler
            .schedule(counting_task(Duration::from_secs(10), "slow", Arc::clone(&slow)));
        thread::sleep(Duration::from_millis(100));

        h.scheduler.schedule(counting_task(
            Duration::from_millis(100),
            "fast",
            Arc::clone(&fast),
        ));
        thread::sleep(Duration::from_millis(300));

        assert!(
            fast.load(Ordering::SeqCst) >= 1,
            "newly scheduled task must not wait out the stale sleep"
        );

        h.scheduler.stop();
        h.handle.join().unwrap();
    }

    #[test]
    fn unschedule_stops_future_executions() {
        let h = start_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Duration::from_millis(150), "H", Arc::clone(&count));

        h.scheduler.schedule(task.clone());
        thread::sleep(Duration::from_millis(380));
        assert!(count.load(Ordering::SeqCst) >= 1);

        h.scheduler.unschedule(task);
        thread::sleep(Duration::from_millis(100));
        let after_removal = count.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(400));
        assert_eq!(
            count.load(Ordering::SeqCst),
            after_removal,
            "no executions may occur after the removal is drained"
        );

        h.scheduler.stop();
        h.handle.join().unwrap();
    }

    #[test]
    fn handler_error_is_fatal_and_reported() {
        let h = start_scheduler();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let task = Task::with_hash(
            Arc::new(move |_: &TaskArgs| -> Result<(), takt_core::HandlerError> {
                c.fetch_add(1, Ordering::SeqCst);
                Err("bad value".into())
            }) as Arc<dyn Handler>,
            vec![],
            Duration::from_millis(50),
            "failing",
        );
        h.scheduler.schedule(task);
        h.handle.join().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1, "fail-stop: no retry");
        assert!(!h.alive.load(Ordering::SeqCst));
        let err = h.crash_rx.try_recv().expect("crash must be reported");
        assert!(matches!(err, TaktError::HandlerFailed { ref hash, .. } if hash == "failing"));
    }

    #[test]
    fn handler_panic_is_fatal_and_reported() {
        let h = start_scheduler();

        let task = Task::with_hash(
            Arc::new(|_: &TaskArgs| -> Result<(), takt_core::HandlerError> {
                panic!("boom")
            }) as Arc<dyn Handler>,
            vec![],
            Duration::from_millis(50),
            "panicking",
        );
        h.scheduler.schedule(task);
        h.handle.join().unwrap();

        let err = h.crash_rx.try_recv().expect("crash must be reported");
        match err {
            TaktError::HandlerPanicked { hash, message } => {
                assert_eq!(hash, "panicking");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stop_exits_loop() {
        let h = start_scheduler();
        assert!(h.scheduler.is_running());
        h.scheduler.stop();
        h.handle.join().unwrap();
        assert!(!h.scheduler.is_running());
    }

    #[test]
    fn metrics_track_executions() {
        let h = start_scheduler();
        let count = Arc::new(AtomicUsize::new(0));

        h.scheduler.schedule(counting_task(
            Duration::from_millis(100),
            "measured",
            Arc::clone(&count),
        ));
        thread::sleep(Duration::from_millis(350));
        h.scheduler.stop();
        h.handle.join().unwrap();

        let metrics = h.scheduler.metrics();
        assert_eq!(
            metrics.executions["measured"],
            count.load(Ordering::SeqCst) as u64
        );
        assert!(metrics.ticks > 0);
        assert!(metrics.last_run.contains_key("measured"));
    }
}
