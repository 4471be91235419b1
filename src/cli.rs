//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tq - run commands through an interval-paced queue
#[derive(Parser)]
#[command(
    name = "tq",
    about = "Run shell commands one by one, never faster than a fixed interval",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/throttleq/logs/tq.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run commands (one per line) from a file or stdin
    Run {
        /// File with one command per line ("-" or omitted for stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Minimum milliseconds between command starts (overrides config)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Pace from the end of each command instead of its start
        #[arg(short, long)]
        await_completion: bool,

        /// Skip commands not yet started once one fails
        #[arg(long)]
        stop_on_failure: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for run reports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
