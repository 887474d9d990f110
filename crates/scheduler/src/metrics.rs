use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics, exposed as snapshots to the host.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Loop iterations completed.
    pub ticks: u64,
    /// Total executions by hash.
    pub executions: HashMap<String, u64>,
    /// Last execution time by hash.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Rolling average handler duration by hash.
    pub avg_handler_duration: HashMap<String, Duration>,
}

impl SchedulerMetrics {
    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    /// Record one handler execution.
    pub fn record_execution(&mut self, hash: &str, duration: Duration) {
        *self.executions.entry(hash.to_string()).or_default() += 1;
        self.last_run.insert(hash.to_string(), Utc::now());

        let count = self.executions[hash];
        let prev_avg = self
            .avg_handler_duration
            .get(hash)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_handler_duration.insert(hash.to_string(), new_avg);
    }
}
