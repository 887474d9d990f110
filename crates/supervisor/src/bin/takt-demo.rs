//! takt-demo — minimal driver for the scheduler and supervisor.
//!
//! Schedules a heartbeat task, polls the healthcheck once a second for the
//! requested duration, then tears everything down. Useful for eyeballing log
//! output and cadence behavior; set `RUST_LOG=debug` to watch the loop.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use takt_core::{load_dotenv, HandlerError, TaktConfig};
use takt_scheduler::{Handler, Task, TaskArgs};
use takt_supervisor::{ExecutionClient, Job};

/// Run a demo heartbeat under supervision.
#[derive(Parser, Debug)]
#[command(name = "takt-demo", version, about)]
struct Cli {
    /// How long to run before terminating, in seconds.
    #[arg(long, env = "TAKT_DEMO_RUN_SECS", default_value_t = 10)]
    run_secs: u64,

    /// Heartbeat period in milliseconds.
    #[arg(long, env = "TAKT_DEMO_BEAT_MS", default_value_t = 1000)]
    beat_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(TaktConfig::log_filter())),
        )
        .init();

    let config = TaktConfig::from_env();
    let client = ExecutionClient::new(config);

    let heartbeat = Task::with_hash(
        Arc::new(|args: &TaskArgs| -> Result<(), HandlerError> {
            info!(?args, "heartbeat");
            Ok(())
        }) as Arc<dyn Handler>,
        vec![json!("demo")],
        Duration::from_millis(cli.beat_ms),
        "heartbeat",
    );
    client.start(Job::periodic(heartbeat));

    for _ in 0..cli.run_secs {
        thread::sleep(Duration::from_secs(1));
        let (alive, status) = client.healthcheck();
        info!(alive, %status, "healthcheck");
        if !alive {
            break;
        }
    }

    client.terminate_all();

    if let Some(metrics) = client.scheduler_metrics() {
        info!(
            beats = metrics.executions.get("heartbeat").copied().unwrap_or(0),
            ticks = metrics.ticks,
            "demo finished"
        );
    }

    if let Some(crash) = client.get_last_exception() {
        anyhow::bail!("demo ended with a crash: {}", crash.error);
    }
    Ok(())
}
