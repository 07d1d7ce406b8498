// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `privdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "privdag",
    version,
    about = "Validate dataset schemas and plan privacy-request traversals.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory containing dataset TOML documents.
    #[arg(long, value_name = "DIR", default_value = "datasets")]
    pub schemas: String,

    /// Identity seed values as KEY=VALUE pairs (repeatable).
    #[arg(long = "seed", value_name = "KEY=VALUE")]
    pub seed: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PRIVDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
