use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dirpipe")]
#[command(about = "Watch a directory and run every new file through a pipeline of operations")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, env = "DIRPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Monitor a directory until interrupted
    Run {
        /// Directory to monitor (overrides the configuration file)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Maximum number of files processed concurrently
        #[arg(short = 'j', long)]
        max_jobs: Option<usize>,

        /// Run every operation's preflight check before monitoring
        #[arg(long)]
        preflight: bool,

        /// Event output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Assemble the pipeline and run its preflight checks
    Check,

    /// List available operation kinds
    Operations,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}
