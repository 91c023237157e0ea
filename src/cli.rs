use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::DEFAULT_CONFIG_FILE;

/// sweepctl - Parameter sweep controller for batch-scheduled simulations
#[derive(Parser)]
#[command(name = "sweepctl")]
#[command(about = "Prepare, collect and analyze generation-barrier parameter sweeps")]
#[command(version)]
pub struct Cli {
    /// Workflow configuration file. Relative paths inside it resolve
    /// against its directory.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Sample, materialize and emit the next generation or the sweep
    #[command(alias = "sample")]
    Prepare,
    /// Gather results; then decide (loop) or analyze (sweep)
    #[command(aliases = ["check", "analyze"])]
    Collect,
    /// Rewrite the continuation sentinel for a generation
    Decide {
        /// Generation that has just completed
        #[arg(short, long)]
        generation: u32,
    },
    /// Show the persisted generation, current graph and sentinel
    Status,
    /// Check the workflow file and problem definition without writing
    Validate,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
