//! ontosync client library
//!
//! Keeps an on-device replica of hierarchical coded reference data
//! (ontologies and their codes) consistent with a remote, sharded dataset.
//!
//! # Overview
//!
//! - **Version guard**: invalidates local state when the backend or client
//!   version changes ([`sync::VersionGuard`])
//! - **Integrity check**: compares local counts with the remote manifest
//!   ([`sync::check_integrity`])
//! - **Shard sync**: streams, verifies and persists every shard concurrently
//!   ([`sync::SyncEngine`])
//! - **Local store**: SQLite replica and key/value cache ([`store::LocalStore`])

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod progress;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SyncError};
pub use store::LocalStore;
pub use sync::{ShardWriteMode, SyncEngine, SyncOutcome, VersionGuard};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ontosync - local replica of coded reference data
#[derive(Parser, Debug)]
#[command(name = "ontosync")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./ontosync.json when present)
    #[arg(short, long, env = "ONTOSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check versions, then bring the local replica in line with the manifest
    Sync {
        /// Skip the startup version check
        #[arg(long)]
        skip_version_check: bool,

        /// Write mode override (streaming, verified_first)
        #[arg(long)]
        write_mode: Option<ShardWriteMode>,
    },

    /// Compare local code counts with the remote manifest
    Check,

    /// Compare stored and running versions and invalidate stale data
    VersionCheck,

    /// Show the stored version and the local ontologies
    Status,

    /// Clear the local cache and all coded data
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
