//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::sync::{ConflictBatch, UploadBatch};

pub mod commands;

/// qsync - Mirror remote saved queries to disk and keep both sides in step
#[derive(Parser, Debug)]
#[command(name = "qsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Local mirror directory (default: ./queries)
    #[arg(long, global = true, env = "QSYNC_DIR")]
    pub dir: Option<PathBuf>,

    /// Server base URL
    #[arg(long, global = true, env = "QSYNC_URL")]
    pub url: Option<String>,

    /// API key for the server
    #[arg(long, global = true, env = "QSYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the local mirror with the server
    Sync(SyncArgs),

    /// Show local edits since the last sync (offline)
    Status,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct SyncArgs {
    /// Classify and count only; write nothing and push nothing
    #[arg(long)]
    pub dry_run: bool,

    /// What to do with queries edited only locally
    #[arg(long, value_enum, default_value_t)]
    pub on_local_change: LocalChangePolicy,

    /// What to do with queries edited on both sides
    #[arg(long, value_enum, default_value_t)]
    pub on_conflict: ConflictPolicy,

    /// Do not render diffs before prompting
    #[arg(long)]
    pub no_diff: bool,
}

/// Starting policy for local-only changes.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LocalChangePolicy {
    /// Prompt for each query (default)
    #[default]
    Ask,
    /// Push every local change
    Push,
    /// Leave every local change unpushed
    Skip,
}

impl From<LocalChangePolicy> for UploadBatch {
    fn from(policy: LocalChangePolicy) -> Self {
        match policy {
            LocalChangePolicy::Ask => Self::Ask,
            LocalChangePolicy::Push => Self::PushAll,
            LocalChangePolicy::Skip => Self::SkipAll,
        }
    }
}

/// Starting policy for conflicts.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Prompt for each conflict (default)
    #[default]
    Ask,
    /// Keep the local body and push it
    Local,
    /// Take the remote body
    Remote,
}

impl From<ConflictPolicy> for ConflictBatch {
    fn from(policy: ConflictPolicy) -> Self {
        match policy {
            ConflictPolicy::Ask => Self::Ask,
            ConflictPolicy::Local => Self::KeepLocalAll,
            ConflictPolicy::Remote => Self::TakeRemoteAll,
        }
    }
}
