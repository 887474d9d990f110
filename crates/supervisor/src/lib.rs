//! Process-wide execution supervision.
//!
//! The [`ExecutionClient`] is the single entry point for running supervised
//! work: it lazily starts exactly one scheduler loop for periodic
//! [`Task`](takt_scheduler::Task)s, spawns and tracks caller-supplied
//! threads, tracks already-started child processes, and surfaces liveness and
//! crash state to the host.
//!
//! Crashes travel over an explicit error channel instead of process-wide
//! hooks: every supervised thread sends its terminal result to the client,
//! which records it and tears the rest of the supervised work down
//! (fail-stop). The host polls [`ExecutionClient::healthcheck`] and
//! [`ExecutionClient::get_last_exception`].

pub mod client;
pub mod crash;
pub mod health;
pub mod job;

pub use client::ExecutionClient;
pub use crash::CrashReport;
pub use health::HealthStatus;
pub use job::{Job, ProcessJob, ThreadJob};
