//! Crash capture state.
//!
//! Supervised threads report terminal faults over an error channel; the host
//! reports its own via [`record_failure`](crate::ExecutionClient::record_failure).
//! The store keeps the most recent of each origin and answers queries with the
//! host-context crash preferred when both are present.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use takt_core::TaktError;

/// One captured crash, with the time it was absorbed.
#[derive(Debug, Clone)]
pub struct CrashReport {
    pub error: Arc<TaktError>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct CrashStore {
    host: Option<CrashReport>,
    background: Option<CrashReport>,
}

impl CrashStore {
    pub fn absorb(&mut self, error: TaktError) {
        let report = CrashReport {
            error: Arc::new(error),
            captured_at: Utc::now(),
        };
        if report.error.is_host() {
            self.host = Some(report);
        } else {
            self.background = Some(report);
        }
    }

    /// Most recently captured crash, host context winning over background.
    pub fn latest(&self) -> Option<CrashReport> {
        self.host.clone().or_else(|| self.background.clone())
    }

    pub fn has_crash(&self) -> bool {
        self.host.is_some() || self.background.is_some()
    }
}
