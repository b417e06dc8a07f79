use crate::types::{LogLevel, OutputFormat, SourceKind};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pmctx")]
#[command(about = "Inspect performance-metric archives and collectors", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Client config file (defaults to $PMCTX_CONFIG, then the XDG config dir)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(long, default_value = "plain", global = true)]
    pub format: OutputFormat,

    #[arg(long, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an archive, archive list, or directory and show each archive's label
    Label {
        /// Archive base name, comma-separated list, or directory
        target: String,
    },

    /// Open contexts and print the context table
    Dump {
        /// Targets to open, in order
        #[arg(required = true)]
        targets: Vec<String>,

        #[arg(long, default_value = "archive")]
        kind: SourceKind,

        /// Duplicate the last context before dumping
        #[arg(long)]
        duplicate: bool,

        /// Only list instance profiles of this instance domain
        #[arg(long)]
        indom: Option<u32>,
    },

    /// Connect to a collector, retrying with backoff
    Probe {
        /// Host specification, e.g. pcp://web01:44321?compress
        host: String,

        /// Further connection attempts, spaced by the reconnect backoff
        #[arg(long, default_value = "0")]
        retries: u32,
    },

    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
