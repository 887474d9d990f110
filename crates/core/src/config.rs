use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaktConfig {
    pub scheduler: SchedulerSettings,
    pub supervisor: SupervisorSettings,
}

/// Timing knobs for the scheduler loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Backoff applied to a task set whose period multiset drained empty.
    /// Effectively "never" — the set stays in the map but goes dormant.
    pub dormant_backoff_secs: u64,
    /// How long the loop sleeps when the task map is empty.
    pub idle_poll_secs: u64,
}

/// Behavior knobs for the execution client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Kill tracked child processes when the client is dropped.
    pub kill_on_drop: bool,
}

impl SchedulerSettings {
    pub fn dormant_backoff(&self) -> Duration {
        Duration::from_secs(self.dormant_backoff_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            dormant_backoff_secs: 1 << 16,
            idle_poll_secs: 60,
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self { kill_on_drop: true }
    }
}

impl Default for TaktConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

impl TaktConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        let defaults = SchedulerSettings::default();
        Self {
            scheduler: SchedulerSettings {
                dormant_backoff_secs: env_u64(
                    "TAKT_DORMANT_BACKOFF_SECS",
                    defaults.dormant_backoff_secs,
                ),
                idle_poll_secs: env_u64("TAKT_IDLE_POLL_SECS", defaults.idle_poll_secs),
            },
            supervisor: SupervisorSettings {
                kill_on_drop: env_bool("TAKT_KILL_ON_DROP", true),
            },
        }
    }

    /// Active log filter, for binaries that initialize a subscriber.
    pub fn log_filter() -> String {
        env_or("RUST_LOG", "info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = TaktConfig::default();
        assert_eq!(cfg.scheduler.dormant_backoff_secs, 65536);
        assert_eq!(cfg.scheduler.idle_poll_secs, 60);
        assert!(cfg.supervisor.kill_on_drop);
    }

    #[test]
    fn dormant_backoff_is_effectively_never() {
        let cfg = SchedulerSettings::default();
        assert!(cfg.dormant_backoff() > Duration::from_secs(60_000));
    }

    #[test]
    fn from_env_overrides_dormant_backoff() {
        std::env::set_var("TAKT_DORMANT_BACKOFF_SECS", "1");
        let cfg = TaktConfig::from_env();
        assert_eq!(cfg.scheduler.dormant_backoff(), Duration::from_secs(1));
        std::env::remove_var("TAKT_DORMANT_BACKOFF_SECS");
    }
}
