//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// kube-events - routes Kubernetes events and object descriptions to sinks
#[derive(Parser, Debug)]
#[command(
    name = "kube-events",
    author,
    version,
    about = "Kubernetes events and descriptions router",
    long_about = "Routes Kubernetes event and object notifications through a bounded queue,\n\
                  drops the ones matching exclude filters, and fans the rest out to the\n\
                  configured sinks (stdout, newRelicInfra)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "KUBE_EVENTS_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "json",
        global = true,
        env = "KUBE_EVENTS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the routers
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "KUBE_EVENTS_CONFIG"
    )]
    pub config: PathBuf,

    /// Newline-delimited JSON event notifications ("-" for stdin)
    #[arg(long, env = "KUBE_EVENTS_EVENTS")]
    pub events: Option<PathBuf>,

    /// Newline-delimited JSON object notifications for the descriptions router
    ///
    /// When omitted the descriptions router exits once --events is exhausted,
    /// or waits for a shutdown signal if no input is given at all.
    #[arg(long, env = "KUBE_EVENTS_OBJECTS")]
    pub objects: Option<PathBuf>,

    /// Prometheus listen address ("off" or empty = disabled)
    #[arg(long, default_value = observability::DEFAULT_METRICS_ADDR, env = "KUBE_EVENTS_METRICS_ADDR")]
    pub metrics_addr: String,

    /// Integration version reported with every shipped event
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"), env = "KUBE_EVENTS_INTEGRATION_VERSION")]
    pub integration_version: String,

    /// Validate configuration and build sinks, then exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    #[default]
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
