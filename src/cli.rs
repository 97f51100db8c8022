//! Command-line interface definition for ResearchFlow
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to inspect local history, record searches and
//! synchronize with the cloud store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ResearchFlow - search history cache with cloud reconciliation
///
/// Manage the local, per-workspace search history and keep it in step with
/// the remote history store.
#[derive(Parser, Debug, Clone)]
#[command(name = "researchflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Path to the local history database (overrides config)
    #[arg(long)]
    pub db: Option<String>,

    /// Base URL of the remote store (overrides config)
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ResearchFlow
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Inspect and manage local search history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Record a completed search
    Record {
        /// Search text
        #[arg(short, long)]
        query: String,

        /// Signed-in user id
        #[arg(short, long)]
        user: Option<String>,

        /// Workspace id (defaults to "default")
        #[arg(short, long)]
        workspace: Option<String>,

        /// Summary text
        #[arg(long)]
        summary: Option<String>,

        /// Key point of the summary (repeatable)
        #[arg(long = "key-point")]
        key_points: Vec<String>,

        /// Follow-up question (repeatable)
        #[arg(long = "question")]
        questions: Vec<String>,
    },

    /// Sign in a user: clear a previous user's data, migrate, reconcile
    Sync {
        /// Signed-in user id
        #[arg(short, long)]
        user: String,

        /// Local workspace id (repeatable)
        #[arg(short, long = "workspace")]
        workspaces: Vec<String>,

        /// JSON file holding the user's workspaces
        #[arg(long)]
        workspaces_file: Option<PathBuf>,
    },

    /// Run the one-time workspace and notes migration
    Migrate {
        /// Signed-in user id
        #[arg(short, long)]
        user: String,

        /// Local workspace id (repeatable)
        #[arg(short, long = "workspace")]
        workspaces: Vec<String>,

        /// JSON file holding the user's workspaces
        #[arg(long)]
        workspaces_file: Option<PathBuf>,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List entries of one partition, newest first
    List {
        /// User id
        #[arg(short, long)]
        user: Option<String>,

        /// Workspace id
        #[arg(short, long)]
        workspace: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Group by Today / Yesterday / This Week / Older
        #[arg(short, long)]
        grouped: bool,

        /// List the workspace's cloud copy instead of the local one
        #[arg(long, requires = "user", conflicts_with = "grouped")]
        cloud: bool,
    },

    /// Delete one entry by id
    Delete {
        /// Entry id
        id: String,

        /// User id
        #[arg(short, long)]
        user: Option<String>,

        /// Workspace id
        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// Empty one partition
    Clear {
        /// User id
        #[arg(short, long)]
        user: Option<String>,

        /// Workspace id
        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// Delete every partition of a user
    ClearUser {
        /// User id
        #[arg(short, long)]
        user: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            db: None,
            remote_url: None,
            verbose: false,
            json_logs: false,
            command: Commands::History {
                command: HistoryCommand::List {
                    user: None,
                    workspace: None,
                    json: false,
                    grouped: false,
                    cloud: false,
                },
            },
        }
    }
}
