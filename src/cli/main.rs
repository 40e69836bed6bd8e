use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser)]
#[clap(
    version,
    about = "Sync Cubox cards and highlights into a Markdown vault"
)]
pub struct Cli {
    /// Path to the settings file
    #[clap(short = 'c', long, value_parser)]
    pub settings: Option<PathBuf>,

    /// Vault root to write into, overriding the saved vault path
    #[clap(long, value_parser)]
    pub vault: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the cubox-sync application
    #[clap(subcommand)]
    pub command: Commands,
}
