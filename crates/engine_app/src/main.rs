//! # engine_app host
//!
//! Builds the configured system tree, drives it at a fixed timestep and
//! tears it down on exit.
//!
//! ## Startup Sequence
//!
//! 1. Load settings (`--config`) and the root manifest (`--manifest`, or the
//!    built-in default).
//! 2. Build the system tree and mark setup as complete.
//! 3. Tick until `--ticks` is reached or Ctrl-C.
//! 4. Finish every system.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine_app::systems;
use engine_app::{AppConfig, LifecycleDriver, TickLoop};
use engine_system::LogLevel;

/// Command-line options; flags override the settings file.
#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Run a system tree on a fixed timestep")]
struct Args {
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON manifest of root systems, replacing the configured one.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Stop after this many ticks (0 = until Ctrl-C).
    #[arg(long)]
    ticks: Option<u64>,

    /// Target ticks per second.
    #[arg(long)]
    tick_rate: Option<f64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("engine_app=info".parse()?)
                .add_directive("engine_system=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };
    if let Some(path) = &args.manifest {
        config.manifest = AppConfig::manifest_from_path(path)?;
    }
    if config.manifest.is_empty() {
        config.manifest = systems::default_manifest();
    }
    if let Some(ticks) = args.ticks {
        config.max_ticks = ticks;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }

    info!("engine host starting");

    let templates = systems::catalog()
        .templates(&config.manifest)
        .context("invalid system manifest")?;

    let mut driver = LifecycleDriver::new(config.driver());
    let built = driver.build(&templates);
    if let Err(err) = built {
        // Whatever did get registered still needs finishing.
        driver.teardown()?;
        return Err(err).context("failed to build systems");
    }
    driver.setup_complete()?;
    driver.debug_log(LogLevel::Info, "all systems running");

    let result = TickLoop::new(config.tick(), &mut driver).run_async().await;
    driver.teardown()?;
    result?;

    info!("engine host shut down");
    Ok(())
}
