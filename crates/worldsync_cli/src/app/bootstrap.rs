use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use worldsync::{resolve_root, validate_root, SessionConfig, SimulatorVersion};

#[derive(Debug, Parser)]
#[command(name = "worldsync", version, about = "Keep Gazebo scene files and a running simulator in sync")]
pub(crate) struct Cli {
    /// Simulator release to target; overrides WORLDSYNC_SIM_VERSION.
    #[arg(long = "sim-version", global = true, value_parser = parse_version)]
    pub(crate) sim_version: Option<SimulatorVersion>,
    /// Project root containing worlds/gazebo/; overrides WORLDSYNC_ROOT.
    #[arg(long, global = true)]
    pub(crate) root: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print the wrapped scene document of every entity in a change file.
    Encode { changes: PathBuf },
    /// Decode a scene file and print its entities as JSON.
    Inspect { scene: PathBuf },
    /// Create or load a world, push a change file to the simulator, shut down.
    Apply {
        #[arg(long)]
        world: String,
        /// Open the existing scene file instead of copying the template.
        #[arg(long)]
        load: bool,
        /// Keep the simulator running until Enter is pressed.
        #[arg(long)]
        hold: bool,
        changes: PathBuf,
    },
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_version(raw: &str) -> Result<SimulatorVersion, String> {
    SimulatorVersion::parse(raw).ok_or_else(|| format!("unknown simulator version '{raw}'"))
}

pub(crate) fn session_config(cli: &Cli) -> Result<SessionConfig, String> {
    let mut config = SessionConfig::from_env().map_err(|error| error.to_string())?;
    if let Some(version) = cli.sim_version {
        config.version = version;
    }
    Ok(config)
}

pub(crate) fn project_root(cli: &Cli) -> Result<PathBuf, String> {
    let root = match &cli.root {
        Some(path) => validate_root(path),
        None => resolve_root(),
    }
    .map_err(|error| error.to_string())?;
    info!(root = %root.display(), "project_root_resolved");
    Ok(root)
}
