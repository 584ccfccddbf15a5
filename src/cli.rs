//! Command-line interface, built with clap's derive API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat operator
///
/// Keeps conversations on a web chat platform answered, one at a time, using
/// a platform configuration produced by the analyzer.
#[derive(Parser, Debug)]
#[command(name = "chat-operator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Directory holding platform configuration files
    #[arg(long, global = true, value_name = "DIR", env = "OPERATOR_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the operator against a platform until stopped
    Run {
        /// Platform name, e.g. "WhatsApp Web"
        platform: String,

        /// Seconds to wait for a manual login (QR scan etc.)
        #[arg(long, value_name = "SECS")]
        manual_wait: Option<u64>,
    },

    /// Validate a platform configuration and print its contents
    Validate {
        /// Platform name, or path to a configuration file
        target: String,

        /// Also print wait timeouts and overrides
        #[arg(short, long)]
        verbose: bool,
    },
}
