// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `tapebridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tapebridge",
    version,
    about = "Extract media metadata and audio through an async I/O bridge.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Tapebridge.toml` in the current working directory; built-in
    /// defaults are used when that file does not exist.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TAPEBRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log every line the extraction program prints.
    #[arg(long)]
    pub verbose: bool,

    /// Parse + validate the config and print it, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Print metadata for a URL as JSON.
    Info {
        url: String,
    },
    /// Download a URL and extract its audio track to OUTPUT.
    Extract {
        url: String,
        output: PathBuf,
    },
    /// Print the conversion tool capabilities the worker sees.
    Capabilities,
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
