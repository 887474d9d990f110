//! [`ExecutionClient`] — the process-wide execution supervisor.

use std::panic::{self, AssertUnwindSafe};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use takt_core::{panic_message, HandlerError, TaktConfig, TaktError};
use takt_scheduler::{Scheduler, SchedulerMetrics};

use crate::crash::{CrashReport, CrashStore};
use crate::health::HealthStatus;
use crate::job::{Job, ThreadJob};

struct TrackedThread {
    name: String,
    handle: JoinHandle<()>,
}

struct TrackedProcess {
    name: String,
    child: Child,
}

struct ClientInner {
    config: TaktConfig,
    /// Shared liveness flag: cleared by `terminate_all` or any crash path.
    /// The scheduler loop and all dispatch gates on it.
    alive: Arc<AtomicBool>,
    crash_tx: Mutex<Sender<TaktError>>,
    crash_rx: Mutex<Receiver<TaktError>>,
    crashes: Mutex<CrashStore>,
    threads: Mutex<Vec<TrackedThread>>,
    processes: Mutex<Vec<TrackedProcess>>,
    /// At most one scheduler, lazily started on the first periodic job.
    scheduler: Mutex<Option<Scheduler>>,
}

impl ClientInner {
    /// Clear liveness, stop the scheduler loop, and kill every tracked
    /// process. Idempotent; called by the host, by any crashed thread, and by
    /// the scheduler thread on its way out.
    fn terminate_all(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            info!("terminating all supervised work");
        }

        if let Some(scheduler) = self.scheduler.lock().unwrap().as_ref() {
            scheduler.stop();
        }

        let mut processes = self.processes.lock().unwrap();
        for tracked in processes.iter_mut() {
            match tracked.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(process = %tracked.name, %status, "process already exited");
                }
                _ => {
                    if let Err(e) = tracked.child.kill() {
                        warn!(process = %tracked.name, error = %e, "failed to kill process");
                    } else {
                        let _ = tracked.child.wait();
                        info!(process = %tracked.name, "process terminated");
                    }
                }
            }
        }
    }
}

/// The process-wide supervisor.
///
/// Owns one lazily started [`Scheduler`], every tracked thread and process,
/// and the captured-crash state. All failure signals surface through
/// [`healthcheck`](ExecutionClient::healthcheck) and
/// [`get_last_exception`](ExecutionClient::get_last_exception); `start`,
/// `stop`, and `terminate_all` never return errors.
pub struct ExecutionClient {
    inner: Arc<ClientInner>,
}

impl ExecutionClient {
    pub fn new(config: TaktConfig) -> Self {
        let (crash_tx, crash_rx) = mpsc::channel();
        Self {
            inner: Arc::new(ClientInner {
                config,
                alive: Arc::new(AtomicBool::new(true)),
                crash_tx: Mutex::new(crash_tx),
                crash_rx: Mutex::new(crash_rx),
                crashes: Mutex::new(CrashStore::default()),
                threads: Mutex::new(Vec::new()),
                processes: Mutex::new(Vec::new()),
                scheduler: Mutex::new(None),
            }),
        }
    }

    /// Dispatch a job by kind. Periodic tasks lazily start the scheduler on
    /// first use; threads are spawned and tracked; processes are assumed
    /// already started and merely tracked.
    pub fn start(&self, job: Job) {
        match job {
            Job::Periodic(task) => {
                debug!(hash = %task.hash(), "starting periodic task");
                self.ensure_scheduler().schedule(task);
            }
            Job::Thread(thread_job) => self.spawn_tracked(thread_job),
            Job::Process(process_job) => {
                info!(process = %process_job.name, "tracking external process");
                self.inner.processes.lock().unwrap().push(TrackedProcess {
                    name: process_job.name,
                    child: process_job.child,
                });
            }
        }
    }

    /// Stop a job. Only periodic tasks can be stopped; removal is best-effort
    /// and idempotent — unknown hashes/periods are silent no-ops.
    pub fn stop(&self, job: Job) {
        match job {
            Job::Periodic(task) => {
                match self.inner.scheduler.lock().unwrap().as_ref() {
                    Some(scheduler) => scheduler.unschedule(task),
                    None => debug!("stop called before any periodic task was started"),
                }
            }
            other => warn!(kind = other.kind(), "stop is only defined for periodic jobs"),
        }
    }

    /// Clear the liveness flag, stop the scheduler loop, and terminate every
    /// tracked process.
    pub fn terminate_all(&self) {
        self.inner.terminate_all();
    }

    /// True iff every tracked thread and process is still alive.
    pub fn is_alive(&self) -> bool {
        let threads_alive = self
            .inner
            .threads
            .lock()
            .unwrap()
            .iter()
            .all(|t| !t.handle.is_finished());

        let mut processes = self.inner.processes.lock().unwrap();
        let processes_alive = processes
            .iter_mut()
            .all(|p| matches!(p.child.try_wait(), Ok(None)));

        threads_alive && processes_alive
    }

    /// Liveness plus terminal-state classification. `Running` while alive;
    /// otherwise `Failed` when a crash was captured, else `Succeeded`.
    pub fn healthcheck(&self) -> (bool, HealthStatus) {
        self.drain_crashes();
        let alive = self.is_alive();
        let status = if alive {
            HealthStatus::Running
        } else if self.inner.crashes.lock().unwrap().has_crash() {
            HealthStatus::Failed
        } else {
            HealthStatus::Succeeded
        };
        (alive, status)
    }

    /// Record a failure from the host's own execution context and tear down
    /// supervised work. Host-context crashes take precedence over background
    /// ones in [`get_last_exception`](ExecutionClient::get_last_exception).
    pub fn record_failure(&self, err: HandlerError) {
        error!(error = %err, "host failure recorded");
        self.inner
            .crashes
            .lock()
            .unwrap()
            .absorb(TaktError::Host(err.to_string()));
        self.inner.terminate_all();
    }

    /// Most recently captured crash, host context preferred.
    pub fn get_last_exception(&self) -> Option<CrashReport> {
        self.drain_crashes();
        self.inner.crashes.lock().unwrap().latest()
    }

    /// Names of all tracked threads, in start order.
    pub fn tracked_threads(&self) -> Vec<String> {
        self.inner
            .threads
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    /// Scheduler metrics snapshot, once the scheduler has started.
    pub fn scheduler_metrics(&self) -> Option<SchedulerMetrics> {
        self.inner
            .scheduler
            .lock()
            .unwrap()
            .as_ref()
            .map(Scheduler::metrics)
    }

    /// Get the scheduler, starting its loop on a tracked thread on first use.
    fn ensure_scheduler(&self) -> Scheduler {
        let mut slot = self.inner.scheduler.lock().unwrap();
        if let Some(scheduler) = slot.as_ref() {
            return scheduler.clone();
        }

        let scheduler = Scheduler::new(
            self.inner.config.scheduler.clone(),
            Arc::clone(&self.inner.alive),
        );
        let crash_tx = self.inner.crash_tx.lock().unwrap().clone();
        let runner = scheduler.clone();
        let inner = Arc::clone(&self.inner);

        let spawned = thread::Builder::new()
            .name("takt-scheduler".into())
            .spawn(move || {
                runner.run(crash_tx);
                // The loop only exits with liveness already cleared (stop or
                // handler fault); take the tracked processes down with it.
                inner.terminate_all();
            });

        match spawned {
            Ok(handle) => {
                info!("scheduler started");
                self.inner.threads.lock().unwrap().push(TrackedThread {
                    name: "takt-scheduler".into(),
                    handle,
                });
            }
            Err(e) => {
                error!(error = %e, "failed to spawn scheduler thread");
                self.inner.crashes.lock().unwrap().absorb(TaktError::Io(e));
            }
        }

        *slot = Some(scheduler.clone());
        scheduler
    }

    /// Spawn a tracked thread whose terminal result is reported over the
    /// crash channel. Any fault tears down all supervised work.
    fn spawn_tracked(&self, job: ThreadJob) {
        let name = job.name;
        let body = job.body;
        let crash_tx = self.inner.crash_tx.lock().unwrap().clone();
        let inner = Arc::clone(&self.inner);
        let thread_name = name.clone();

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(body));
            let err = match outcome {
                Ok(Ok(())) => {
                    debug!(thread = %thread_name, "tracked thread finished");
                    None
                }
                Ok(Err(e)) => Some(TaktError::ThreadFailed {
                    name: thread_name.clone(),
                    message: e.to_string(),
                }),
                Err(payload) => Some(TaktError::ThreadPanicked {
                    name: thread_name.clone(),
                    message: panic_message(payload.as_ref()),
                }),
            };

            if let Some(err) = err {
                error!(thread = %thread_name, error = %err, "tracked thread crashed");
                let _ = crash_tx.send(err);
                inner.terminate_all();
            }
        });

        match spawned {
            Ok(handle) => {
                info!(thread = %name, "tracked thread started");
                self.inner
                    .threads
                    .lock()
                    .unwrap()
                    .push(TrackedThread { name, handle });
            }
            Err(e) => {
                error!(thread = %name, error = %e, "failed to spawn tracked thread");
                self.inner.crashes.lock().unwrap().absorb(TaktError::Io(e));
            }
        }
    }

    /// Absorb everything pending on the crash channel into the store.
    fn drain_crashes(&self) {
        let rx = self.inner.crash_rx.lock().unwrap();
        let mut crashes = self.inner.crashes.lock().unwrap();
        while let Ok(err) = rx.try_recv() {
            crashes.absorb(err);
        }
    }
}

impl Default for ExecutionClient {
    fn default() -> Self {
        Self::new(TaktConfig::default())
    }
}

impl Drop for ExecutionClient {
    fn drop(&mut self) {
        if self.inner.config.supervisor.kill_on_drop {
            self.inner.terminate_all();
        }
    }
}
