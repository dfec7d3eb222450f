//! opsweep - instruction-space sweep supervisor.
//!
//! Partitions a 32-bit instruction range across a fleet of fuzzer worker
//! processes and monitors them in a live terminal dashboard until the sweep
//! completes, a worker crashes, or the user quits.
//!
//! # Usage
//!
//! ```bash
//! # Sweep the whole space with one worker per CPU
//! opsweep
//!
//! # Four workers over a subrange, filter level 2, thumb mode
//! opsweep -s 0x10000000 -e 0x1fffffff -w 4 -f 2 -t
//! ```

use std::fs::{self, File};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sweep_supervisor::config::{SupervisorArgs, SupervisorConfig};
use sweep_supervisor::dashboard::TerminalSession;
use sweep_supervisor::fleet::WorkerFleet;
use sweep_supervisor::lifecycle::Controller;
use sweep_supervisor::partition::partition;

fn main() -> Result<()> {
    let args = SupervisorArgs::parse();
    let config: SupervisorConfig = args.try_into()?;

    fs::create_dir_all(&config.status_dir)
        .with_context(|| format!("creating status directory {:?}", config.status_dir))?;
    init_logging(&config)?;

    info!(
        "sweeping {} with {} workers, binary {:?}",
        config.range, config.workers, config.worker_bin
    );
    if let Ok(json) = serde_json::to_string(&config) {
        debug!("config: {json}");
    }

    let assignments = partition(config.range, config.workers)?;
    let fleet = match WorkerFleet::spawn(&assignments, &config.fuzzer, &config.worker_bin) {
        Ok(fleet) => fleet,
        Err(err) => {
            // Spawn failures are reported before the terminal is taken over
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let session = TerminalSession::new().context("setting up the terminal")?;
    let mut controller = Controller::new(fleet, session, config.range, config.status_dir.clone());
    let outcome = controller.run();
    // Dropping the controller reaps the fleet and restores the terminal
    // before anything is printed
    drop(controller);
    let outcome = outcome?;

    println!("{outcome}");
    Ok(())
}

/// Route tracing output to a file inside the status directory; stdout
/// belongs to the dashboard.
fn init_logging(config: &SupervisorConfig) -> Result<()> {
    let path = config.status_dir.join("supervisor.log");
    let file = File::create(&path).with_context(|| format!("creating log file {:?}", path))?;
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}
