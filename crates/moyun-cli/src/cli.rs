use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "moyun")]
#[command(about = "Sync, replay and back up MoYun documents from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local cache database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile settings, documents and the world library with the remote store
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued document changes against the remote store
    Drain {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued document changes
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Discard every queued change instead of listing them
        #[arg(long)]
        discard: bool,
    },
    /// Work with local documents
    Docs {
        #[command(subcommand)]
        command: DocsCommands,
    },
    /// Create, list and restore remote backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Device presence
    Devices {
        #[command(subcommand)]
        command: DevicesCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum DocsCommands {
    /// List documents, most recently modified first
    List {
        /// Number of documents to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one document body as JSON
    Show {
        /// Document ID
        id: String,
    },
    /// Create a document; paragraphs come from stdin or $EDITOR
    New {
        /// Document title
        title: Vec<String>,
    },
    /// Delete a document locally and queue the remote delete
    Delete {
        /// Document ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Snapshot local documents, library and settings to the remote store
    Create {
        /// Free-form note stored with the backup
        #[arg(long, default_value = "Manual backup")]
        note: String,
    },
    /// List backups, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace local and remote state with a backup
    Restore {
        /// Backup ID
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Delete a backup
    Delete {
        /// Backup ID
        id: String,
    },
    /// Delete backups older than the retention window
    Prune {
        /// Override the configured retention in days
        #[arg(long, value_name = "DAYS")]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum DevicesCommands {
    /// Record this device as seen now
    Heartbeat,
    /// List known devices
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count devices seen within the liveness window
    Count,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the resolved profile
    Show {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Initialize or update a profile
    Set {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote database URL
        #[arg(long, value_name = "URL")]
        database_url: Option<String>,
        /// Account id whose data this profile syncs
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
        /// Days to keep backups
        #[arg(long, value_name = "DAYS")]
        backup_retention_days: Option<u32>,
        /// Hours between automatic backups
        #[arg(long, value_name = "HOURS")]
        auto_backup_interval_hours: Option<u32>,
        /// Days a device counts as active after its last heartbeat
        #[arg(long, value_name = "DAYS")]
        device_liveness_days: Option<u32>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}
