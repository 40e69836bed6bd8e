use std::process;

use clap::Parser;
use console::style;
use log::{error, info};

use cubox_sync::{App, Cli, Result, SettingsStore};

pub fn initialize_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let path = match cli.settings {
        Some(path) => path,
        None => SettingsStore::default_path()?,
    };

    let mut app = App::new(SettingsStore::new(path), cli.vault, cli.verbose)?;
    app.run(cli.command).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(1);
    }
}
