//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured load profile against the target URL
    Run {
        /// Target URL, overriding scenario.target_url
        #[arg(long, value_name = "URL", env = "VOLLEY_TARGET_URL")]
        url: Option<String>,

        /// Answer every request from a local mock instead of the network
        #[arg(long)]
        offline: bool,

        /// Status code returned by the offline mock
        #[arg(long, value_name = "CODE", default_value_t = 200, requires = "offline")]
        mock_status: u16,

        /// Latency of the offline mock, in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 0, requires = "offline")]
        mock_latency_ms: u64,

        /// Write the run summary as JSON to this path
        #[arg(long, value_name = "PATH")]
        summary_export: Option<PathBuf>,
    },

    /// Validate the configuration file, including schedule and thresholds
    Validate,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate a sample configuration
    Generate {
        /// Output file path; printed to stdout when omitted
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration (file plus environment overrides)
    Show,
}
