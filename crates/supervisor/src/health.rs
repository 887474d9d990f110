use std::fmt;

use serde::Serialize;

/// Terminal-state classification reported by
/// [`healthcheck`](crate::ExecutionClient::healthcheck).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Every supervised thread and process is still alive.
    Running,
    /// Supervised work ended without a captured crash.
    Succeeded,
    /// A crash was captured from a handler, thread, or the host.
    Failed,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Running => "RUNNING",
            HealthStatus::Succeeded => "SUCCEEDED",
            HealthStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
