//! # sim_app — fleet operator
//!
//! Boots a container manager, creates one container from CLI flags, starts
//! it, and auto-advances until ctrl-c.
//!
//! ## Startup sequence
//!
//! 1. Initialise structured logging (env-filterable).
//! 2. Create the fleet manager and one container.
//! 3. `start()` the container (loads module archives from the scan dir).
//! 4. `play(interval)` to begin fixed-rate ticking.
//! 5. On ctrl-c, stop the whole fleet in order.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_runtime::{ContainerConfig, ContainerManager};

#[derive(Debug, Parser)]
#[command(name = "sim_app", about = "Simulation container fleet")]
struct Args {
    /// Container name.
    #[arg(long, default_value = "main")]
    name: String,

    /// Directory scanned for module archives.
    #[arg(long, default_value = "modules")]
    modules: PathBuf,

    /// Root directory for per-container resource areas.
    #[arg(long, default_value = "resources")]
    resources: PathBuf,

    /// ECS entity capacity.
    #[arg(long, default_value_t = 10_000)]
    max_entities: usize,

    /// ECS component-column capacity.
    #[arg(long, default_value_t = 64)]
    max_components: usize,

    /// Auto-advance interval in milliseconds.
    #[arg(long, default_value_t = 50)]
    interval_ms: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sim_app=info".parse()?))
        .init();

    let args = Args::parse();
    info!(name = args.name, "fleet starting");

    let manager = ContainerManager::with_resource_root(args.resources);

    let mut config = ContainerConfig::new(args.name);
    config.module_scan_directory = args.modules;
    config.max_entities = args.max_entities;
    config.max_components = args.max_components;

    let container = manager.create_container(config)?;
    container.start()?;
    container.play(args.interval_ms)?;
    info!(
        container = container.id(),
        interval_ms = args.interval_ms,
        "container ticking"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    manager.shutdown_all().await;
    info!("fleet shut down");
    Ok(())
}
