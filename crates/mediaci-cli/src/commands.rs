//! CLI command definitions.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a build registry
    Validate {
        /// Registry file, defaults to the configured one
        registry: Option<PathBuf>,
    },

    /// Show what a change would build, without running anything
    Plan {
        registry: Option<PathBuf>,

        #[command(flatten)]
        change: ChangeArgs,
    },

    /// Process a change end to end
    Run {
        registry: Option<PathBuf>,

        #[command(flatten)]
        change: ChangeArgs,

        /// Log commands instead of executing them
        #[arg(long)]
        dry_run: bool,

        /// Directory stage workdirs are resolved against
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Run a smoke test suite
    Smoke {
        /// Suite file
        suite: PathBuf,

        /// Media root the case paths are relative to
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Check one output against a reference
    Compare {
        /// md5 or psnr
        #[arg(long)]
        ref_type: String,

        #[arg(long)]
        ref_value: String,

        /// Output file to hash
        #[arg(long, required_unless_present = "metrics_output", conflicts_with = "metrics_output")]
        file: Option<PathBuf>,

        /// Saved output of the metrics tool
        #[arg(long)]
        metrics_output: Option<PathBuf>,
    },

    /// Print the JSON schema of the registry file
    Schema,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// The change being processed.
#[derive(Args, Debug, Clone)]
pub struct ChangeArgs {
    /// Repository URL
    #[arg(long)]
    pub repository: String,

    /// Branch or pull request ref
    #[arg(long)]
    pub branch: String,

    #[arg(long)]
    pub revision: String,

    /// Branch the change is built as, e.g. a pull request's base
    #[arg(long)]
    pub target_branch: Option<String>,

    /// File touched by the change; repeat for several
    #[arg(long = "file")]
    pub files: Vec<String>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
