//! Periodic task scheduling on a single background thread.
//!
//! Callers describe recurring work as [`Task`] values — a handler, its
//! arguments, a period, and a grouping hash. Tasks sharing a hash are merged
//! into one [`TaskSet`] that fires at the minimum of all requested periods.
//! The [`Scheduler`] owns the registry of task sets and runs every due handler
//! sequentially on its own thread; `schedule`/`unschedule` requests from other
//! threads are queued and drained at the top of each loop iteration.
//!
//! Handlers that return an error (or panic) are fatal to the scheduler thread:
//! the failure is reported over the crash channel and the loop exits. Retry
//! semantics, if any, belong inside the handler body.

pub mod map;
pub mod metrics;
pub mod runner;
pub mod set;
pub mod task;

pub use map::TaskMap;
pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use set::{TaskSet, DORMANT_BACKOFF};
pub use task::{Handler, Task, TaskArgs};
