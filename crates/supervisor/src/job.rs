//! [`Job`] — the sum type of everything the client can supervise.

use std::fmt;
use std::process::Child;

use takt_core::HandlerError;
use takt_scheduler::Task;

/// Body run on a tracked thread; its terminal result is reported to the
/// supervising client.
pub type ThreadBody = Box<dyn FnOnce() -> Result<(), HandlerError> + Send + 'static>;

/// Caller-supplied work to run on a new tracked thread.
pub struct ThreadJob {
    pub(crate) name: String,
    pub(crate) body: ThreadBody,
}

impl ThreadJob {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An already-started child process handed over for tracking.
pub struct ProcessJob {
    pub(crate) name: String,
    pub(crate) child: Child,
}

impl ProcessJob {
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Everything [`ExecutionClient::start`](crate::ExecutionClient::start)
/// accepts. Adding a job kind is a compile-checked exhaustive match, not a
/// runtime type probe.
pub enum Job {
    /// Periodic task handed to the lazily started scheduler.
    Periodic(Task),
    /// Work spawned on a new tracked thread.
    Thread(ThreadJob),
    /// Already-started process to track (not coordinated).
    Process(ProcessJob),
}

impl Job {
    pub fn periodic(task: Task) -> Self {
        Job::Periodic(task)
    }

    pub fn thread<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        Job::Thread(ThreadJob::new(name, body))
    }

    pub fn process(name: impl Into<String>, child: Child) -> Self {
        Job::Process(ProcessJob::new(name, child))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::Periodic(_) => "periodic",
            Job::Thread(_) => "thread",
            Job::Process(_) => "process",
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Periodic(task) => f.debug_tuple("Periodic").field(task).finish(),
            Job::Thread(t) => f.debug_struct("Thread").field("name", &t.name).finish(),
            Job::Process(p) => f.debug_struct("Process").field("name", &p.name).finish(),
        }
    }
}
