//! CLI module for the cubox-sync application
//!
//! This module handles the command-line interface: running syncs, browsing
//! folders and tags, editing filters and settings.
use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use console::style;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::{
    parse_list, CardStatus, Commands, ContentType, CuboxApi, CuboxSource, Filter,
    FilterCommand, Result, SettingsStore, StatusFilter, SyncError, SyncOutcome, SyncScheduler,
    SyncSettings, Syncer, TagChoice, Vault, FRONT_MATTER_VARIABLES, MAX_REQUEST_TIMEOUT_SECS,
};

/// CLI Application handler - processes CLI commands against the saved settings
pub struct App {
    /// Where settings are persisted
    store: SettingsStore,

    /// Settings as loaded at startup, plus any edits made by this command
    settings: SyncSettings,

    /// Vault root given on the command line
    vault_override: Option<PathBuf>,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Create a new CLI application backed by the given settings store
    pub fn new(store: SettingsStore, vault_override: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let settings = store.load()?;
        Ok(Self {
            store,
            settings,
            vault_override,
            verbose,
        })
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Sync => self.handle_sync().await?,
            Commands::Watch { interval } => self.handle_watch(interval).await?,
            Commands::Folders { json } => self.handle_folders(json).await?,
            Commands::Tags { json } => self.handle_tags(json).await?,
            Commands::Filter { target } => self.handle_filter(target).await?,
            Commands::Config { show, set, reset } => self.handle_config(show, set, reset)?,
            Commands::Status => self.handle_status()?,
            Commands::Reindex => self.handle_reindex()?,
        }

        Ok(())
    }

    fn output_dir(&self) -> PathBuf {
        match &self.vault_override {
            Some(vault) => vault.join(&self.settings.target_folder),
            None => self.settings.output_dir(),
        }
    }

    fn api(&self) -> Result<CuboxApi> {
        if self.settings.domain.trim().is_empty() {
            return Err(SyncError::ConfigError {
                message: "No Cubox domain set; run `config --set domain=cubox.pro` (or cubox.cc)"
                    .to_string(),
            });
        }
        if self.settings.api_key.trim().is_empty() {
            return Err(SyncError::ConfigError {
                message: "No API key set; run `config --set api_key=<key>`".to_string(),
            });
        }

        CuboxApi::new(
            &self.settings.domain,
            &self.settings.api_key,
            Duration::from_secs(
                self.settings
                    .request_timeout_secs
                    .clamp(1, MAX_REQUEST_TIMEOUT_SECS),
            ),
        )
    }

    fn syncer(&self) -> Result<Syncer<CuboxApi>> {
        Ok(Syncer::new(self.api()?, self.store.clone())
            .with_vault_override(self.vault_override.clone()))
    }

    fn save(&self) -> Result<()> {
        self.store.save(&self.settings)
    }

    async fn handle_sync(&self) -> Result<()> {
        let mut syncer = self.syncer()?;
        println!("Syncing Cubox into {}", self.output_dir().display());

        match syncer.sync().await {
            Ok(SyncOutcome::Completed(summary)) => {
                println!("{}", style(format!("Sync complete: {}", summary)).green());
                if self.verbose && summary.unavailable > 0 {
                    println!("{} cards had no content and were left out", summary.unavailable);
                }
                Ok(())
            }
            Ok(SyncOutcome::AlreadyRunning) => {
                println!("{}", style("A sync is already running").yellow());
                Ok(())
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    style("Sync failed; check your settings and network connection").red()
                );
                Err(e)
            }
        }
    }

    async fn handle_watch(&self, interval: Option<u64>) -> Result<()> {
        let interval = interval.unwrap_or(self.settings.sync_interval_minutes);
        let syncer = Arc::new(Mutex::new(self.syncer()?));
        let mut scheduler = SyncScheduler::new(syncer);

        scheduler.start(interval).await?;
        scheduler.sync_now().await?;
        if interval == 0 {
            println!("Automatic sync is disabled; running once. Press Ctrl-C to exit.");
        } else {
            println!("Syncing every {} minutes. Press Ctrl-C to stop.", interval);
        }

        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, shutting down");
        scheduler.stop().await
    }

    async fn handle_folders(&self, json: bool) -> Result<()> {
        let folders = self.api()?.list_folders().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&folders)?);
            return Ok(());
        }

        for folder in &folders {
            let marker = if self.settings.folder_filter.contains(&folder.id) {
                style("[x]").green()
            } else {
                style("[ ]").dim()
            };
            let name = if folder.nested_name.is_empty() {
                &folder.name
            } else {
                &folder.nested_name
            };
            println!("{} {}  {}", marker, name, style(&folder.id).dim());
        }
        println!("\nFound {} folder{}", folders.len(), plural(folders.len()));
        Ok(())
    }

    async fn handle_tags(&self, json: bool) -> Result<()> {
        let tags = self.api()?.list_tags().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&tags)?);
            return Ok(());
        }

        for tag in &tags {
            let marker = if self
                .settings
                .tag_filter
                .contains(&TagChoice::Tag(tag.id.clone()))
            {
                style("[x]").green()
            } else {
                style("[ ]").dim()
            };
            let name = if tag.nested_name.is_empty() {
                &tag.name
            } else {
                &tag.nested_name
            };
            println!("{} #{}  {}", marker, name, style(&tag.id).dim());
        }
        println!("\nFound {} tag{}", tags.len(), plural(tags.len()));
        Ok(())
    }

    async fn handle_filter(&mut self, target: FilterCommand) -> Result<()> {
        match target {
            FilterCommand::Folder { ids, toggle, all } => {
                if all {
                    self.settings.folder_filter.select_all();
                } else if let Some(id) = toggle {
                    let universe: Vec<String> = self
                        .api()?
                        .list_folders()
                        .await?
                        .into_iter()
                        .map(|f| f.id)
                        .collect();
                    if !universe.contains(&id) {
                        warn!("Folder {} is not one of your Cubox folders", id);
                    }
                    self.settings.folder_filter.toggle(id, &universe);
                } else if ids.is_some() {
                    self.settings.folder_filter = Filter::subset(parse_list(ids));
                }
            }

            FilterCommand::Tag {
                ids,
                toggle,
                untagged,
                all,
            } => {
                if all {
                    self.settings.tag_filter.select_all();
                } else if let Some(id) = toggle {
                    let mut universe: Vec<TagChoice> = self
                        .api()?
                        .list_tags()
                        .await?
                        .into_iter()
                        .map(|t| TagChoice::Tag(t.id))
                        .collect();
                    universe.push(TagChoice::Untagged);

                    let choice = if id == "untagged" {
                        TagChoice::Untagged
                    } else {
                        TagChoice::Tag(id)
                    };
                    self.settings.tag_filter.toggle(choice, &universe);
                } else if ids.is_some() || untagged {
                    let mut choices: Vec<TagChoice> =
                        parse_list(ids).into_iter().map(TagChoice::Tag).collect();
                    if untagged {
                        choices.push(TagChoice::Untagged);
                    }
                    self.settings.tag_filter = Filter::subset(choices);
                }
            }

            FilterCommand::Type { types, all } => {
                if all {
                    self.settings.type_filter.select_all();
                } else if types.is_some() {
                    let parsed = parse_list(types)
                        .iter()
                        .map(|t| {
                            ContentType::parse(t).ok_or_else(|| SyncError::ConfigError {
                                message: format!("Unknown content type: {}", t),
                            })
                        })
                        .collect::<Result<Vec<ContentType>>>()?;
                    let filter = Filter::subset(parsed);
                    self.settings.type_filter = if filter
                        .selected()
                        .is_some_and(|types| types.len() == ContentType::ALL.len())
                    {
                        Filter::All
                    } else {
                        filter
                    };
                }
            }

            FilterCommand::Status { toggle, all } => {
                if all {
                    self.settings.status_filter = StatusFilter::All;
                } else {
                    for value in parse_list(toggle) {
                        let status =
                            CardStatus::parse(&value).ok_or_else(|| SyncError::ConfigError {
                                message: format!("Unknown status: {}", value),
                            })?;
                        self.settings.status_filter.toggle(status);
                    }
                }
            }
        }

        self.save()?;
        self.print_filters();
        Ok(())
    }

    fn print_filters(&self) {
        println!("Folders:  {}", describe(&self.settings.folder_filter));
        println!("Tags:     {}", describe(&self.settings.tag_filter));
        println!("Types:    {}", describe(&self.settings.type_filter));
        let status = match self.settings.status_filter {
            StatusFilter::All => "all".to_string(),
            StatusFilter::Only {
                read,
                starred,
                annotated,
            } => [("read", read), ("starred", starred), ("annotated", annotated)]
                .iter()
                .filter(|(_, on)| *on)
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        };
        println!("Statuses: {}", status);
    }

    fn handle_config(&mut self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        let show = show || (set.is_none() && !reset);

        if reset {
            self.settings = self.store.reset()?;
            println!("Configuration reset to defaults");
        }

        if let Some(assignment) = set {
            let (key, value) =
                assignment
                    .split_once('=')
                    .ok_or_else(|| SyncError::InvalidFormat {
                        message: format!("Expected key=value, got: {}", assignment),
                    })?;
            self.settings.set_value(key.trim(), value)?;
            self.save()?;
            println!("Updated {}", key.trim());
        }

        if show {
            let mut shown = self.settings.clone();
            if !shown.api_key.is_empty() {
                shown.api_key = "********".to_string();
            }
            println!("Settings file: {}", self.store.path().display());
            println!("{}", serde_json::to_string_pretty(&shown)?);
            println!(
                "\nFront matter variables: {}",
                FRONT_MATTER_VARIABLES.join(", ")
            );
        }

        Ok(())
    }

    fn handle_status(&self) -> Result<()> {
        let now = Utc::now();
        let checkpoint = &self.settings.checkpoint;

        println!("Output folder: {}", self.output_dir().display());
        match checkpoint.last_sync_time {
            Some(time) => println!(
                "Last sync:     {}",
                time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
            ),
            None => println!("Last sync:     never"),
        }

        match &checkpoint.last_card_id {
            Some(id) => println!(
                "Progress:      interrupted after card {}; the next sync resumes there",
                id
            ),
            None => println!("Progress:      last run completed"),
        }

        match &self.settings.lease {
            Some(lease) if lease.is_expired(now) => println!(
                "Lease:         {} (stale, held by {}; the next sync reclaims it)",
                style("expired").yellow(),
                lease.holder
            ),
            Some(lease) => println!(
                "Lease:         {} by {} until {}",
                style("running").green(),
                lease.holder,
                lease.expires_at
            ),
            None => println!("Lease:         idle"),
        }

        let index = Vault::new(self.output_dir()).load_index()?;
        println!("Indexed notes: {}", index.len());
        Ok(())
    }

    fn handle_reindex(&self) -> Result<()> {
        let vault = Vault::new(self.output_dir());
        let index = vault.rebuild_index()?;
        if vault.root().exists() {
            vault.save_index(&index)?;
        }
        println!(
            "Indexed {} note{} in {}",
            index.len(),
            plural(index.len()),
            vault.root().display()
        );
        Ok(())
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn describe<T: Ord + Clone + std::fmt::Display>(filter: &Filter<T>) -> String {
    match filter.selected() {
        None => "all".to_string(),
        Some(items) => items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
}
