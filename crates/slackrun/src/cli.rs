use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// slackrun – post test-run results to Slack
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Raise log verbosity above the configured level (-v, -vv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a run summary to the configured destination
    Send {
        /// Run summary JSON produced by the test reporter
        #[arg(short, long, value_name = "FILE")]
        summary: PathBuf,

        /// Print per-channel results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print build information
    Version {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
