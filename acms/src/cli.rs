//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// acms - autonomous code-modification pipeline
#[derive(Parser)]
#[command(
    name = "acms",
    about = "Executes dependency-ordered, guardrail-checked code-modification runs",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/acms/logs/acms.log"
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
    /// Start the background run-supervisor daemon
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon status and in-flight runs
    Status {
        /// Show detailed run information
        #[arg(short, long)]
        detailed: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show daemon logs
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Run a single execution run against a repository (for development/testing,
    /// or invoked directly by the supervisor as a child process)
    Run {
        /// Repository root to operate on
        #[arg(value_name = "REPO_ROOT")]
        repo_root: String,

        /// Resume an existing, already-persisted run instead of creating one
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Internal: poll the state store and spawn run processes (used by `start`)
    #[command(hide = true)]
    RunDaemon,

    /// Show metrics and statistics
    Metrics {
        /// Run id to filter by
        #[arg(short = 'r', long)]
        run_id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for status/metrics commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {}. Use: text, json, or table", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}
