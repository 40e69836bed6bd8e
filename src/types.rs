//! Shared result types and the CLI command tree.
use std::fmt;

use clap::Subcommand;

use crate::SyncError;

/// A specialized Result type for cubox-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// What happened to a single article during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleOutcome {
    /// A note was written
    Synced,
    /// A note for this article already exists
    Skipped,
    /// Cubox had no content for the article
    Unavailable,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub skipped: usize,
    pub unavailable: usize,
    pub errors: usize,
    /// Number of non-empty pages processed
    pub pages: usize,
}

impl SyncSummary {
    pub fn record(&mut self, outcome: ArticleOutcome) {
        match outcome {
            ArticleOutcome::Synced => self.synced += 1,
            ArticleOutcome::Skipped => self.skipped += 1,
            ArticleOutcome::Unavailable => self.unavailable += 1,
        }
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} synced, {} skipped, {} error{}",
            self.synced,
            self.skipped,
            self.errors,
            if self.errors == 1 { "" } else { "s" }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Another run holds the sync lease; nothing was done
    AlreadyRunning,
    Completed(SyncSummary),
}

/// Available subcommands for the cubox-sync application
#[derive(Subcommand)]
pub enum Commands {
    /// Sync Cubox cards into the vault once
    Sync,

    /// Keep running and sync on the configured interval
    Watch {
        /// Override the sync interval in minutes
        #[clap(short, long)]
        interval: Option<u64>,
    },

    /// List Cubox folders
    Folders {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// List Cubox tags
    Tags {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Choose which cards get synced
    Filter {
        #[clap(subcommand)]
        target: FilterCommand,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },

    /// Show sync progress and lease state
    Status,

    /// Rebuild the article id index from the notes in the vault
    Reindex,
}

#[derive(Subcommand)]
pub enum FilterCommand {
    /// Restrict syncing to folders
    Folder {
        /// Folder ids to sync (comma-separated)
        #[clap(short, long)]
        ids: Option<String>,

        /// Flip a single folder in or out of the selection
        #[clap(short, long)]
        toggle: Option<String>,

        /// Sync every folder
        #[clap(short, long)]
        all: bool,
    },

    /// Restrict syncing to tags
    Tag {
        /// Tag ids to sync (comma-separated)
        #[clap(short, long)]
        ids: Option<String>,

        /// Flip a single tag in or out of the selection
        #[clap(short, long)]
        toggle: Option<String>,

        /// Include cards without tags
        #[clap(short, long)]
        untagged: bool,

        /// Sync every tag
        #[clap(short, long)]
        all: bool,
    },

    /// Restrict syncing to content types
    Type {
        /// Types to sync: article, snippet, memo, image, audio, video, file
        #[clap(short, long)]
        types: Option<String>,

        /// Sync every type
        #[clap(short, long)]
        all: bool,
    },

    /// Restrict syncing by read, starred or annotated status
    Status {
        /// Statuses to flip: read, starred, annotated (comma-separated)
        #[clap(short, long)]
        toggle: Option<String>,

        /// Sync regardless of status
        #[clap(short, long)]
        all: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_and_display() {
        let mut summary = SyncSummary::default();
        summary.record(ArticleOutcome::Synced);
        summary.record(ArticleOutcome::Synced);
        summary.record(ArticleOutcome::Skipped);
        summary.record(ArticleOutcome::Unavailable);
        summary.errors = 1;

        assert_eq!(summary.to_string(), "2 synced, 1 skipped, 1 error");
        assert_eq!(summary.unavailable, 1);
    }
}
