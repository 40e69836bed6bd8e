//! Drives one synchronization run from Cubox into the vault.
//!
//! Pages and the articles inside them are processed strictly in server order.
//! The checkpoint is advanced and persisted only once every article of a page
//! has been handled, so an interrupted run resumes at the first page that was
//! not fully written.
use std::path::PathBuf;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::{
    compose_note, Article, ArticleOutcome, CuboxSource, Cursor, NoteIndex, Result,
    SettingsStore, SyncLease, SyncOutcome, SyncSettings, SyncSummary, TemplateRenderer, Vault,
};

/// Owns the remote source and the persisted settings for sync runs
pub struct Syncer<S: CuboxSource> {
    source: S,
    store: SettingsStore,
    settings: SyncSettings,
    vault_override: Option<PathBuf>,
    holder: String,
}

impl<S: CuboxSource> Syncer<S> {
    pub fn new(source: S, store: SettingsStore) -> Self {
        Self {
            source,
            store,
            settings: SyncSettings::default(),
            vault_override: None,
            holder: format!("pid-{}", std::process::id()),
        }
    }

    /// Uses `vault` instead of the persisted vault path for every run
    pub fn with_vault_override(mut self, vault: Option<PathBuf>) -> Self {
        self.vault_override = vault;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Picks up settings written by other invocations since the last run
    fn reload(&mut self) -> Result<()> {
        self.settings = self.store.load()?;
        if let Some(vault) = &self.vault_override {
            self.settings.vault_path = vault.clone();
        }
        self.source
            .update_config(&self.settings.domain, &self.settings.api_key)
    }

    /// Writes the checkpoint and lease back, leaving every other stored
    /// setting as it currently is on disk
    fn persist(&self) -> Result<()> {
        let mut stored = self.store.load()?;
        stored.checkpoint = self.settings.checkpoint.clone();
        stored.lease = self.settings.lease.clone();
        self.store.save(&stored)
    }

    /// Runs one sync pass.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] without touching anything when
    /// another run holds a live lease. On failure the lease is still released
    /// and the checkpoint keeps the end of the last completed page.
    pub async fn sync(&mut self) -> Result<SyncOutcome> {
        self.reload()?;

        let now = Utc::now();
        if let Some(lease) = self.settings.active_lease(now) {
            info!(
                "Sync already running (lease held by {} until {})",
                lease.holder, lease.expires_at
            );
            return Ok(SyncOutcome::AlreadyRunning);
        }
        if let Some(stale) = &self.settings.lease {
            warn!(
                "Reclaiming stale sync lease held by {} since {}",
                stale.holder, stale.acquired_at
            );
        }

        self.settings.lease = Some(SyncLease::new(
            self.holder.clone(),
            now,
            self.settings.lease_ttl(),
        ));
        self.persist()?;

        let result = self.run_pages().await;

        self.settings.lease = None;
        let released = self.persist();

        match (result, released) {
            (Ok(summary), Ok(())) => {
                info!("Sync finished: {}", summary);
                Ok(SyncOutcome::Completed(summary))
            }
            (Ok(_), Err(e)) => {
                error!("Sync finished but settings could not be saved: {}", e);
                Err(e)
            }
            (Err(e), released) => {
                if let Err(save_err) = released {
                    error!("Failed to release sync lease: {}", save_err);
                }
                error!("Sync aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn run_pages(&mut self) -> Result<SyncSummary> {
        let vault = Vault::new(self.settings.output_dir());
        vault.ensure_dir()?;
        let mut index = vault.load_index()?;

        let renderer = TemplateRenderer::new(&self.settings.date_format);
        let filters = self.settings.filters();
        let mut cursor = Cursor::new(
            self.settings.checkpoint.last_card_id.clone(),
            self.settings.checkpoint.last_card_update_time.clone(),
        );
        if let Some(id) = &cursor.last_card_id {
            info!("Resuming previous sync after card {}", id);
        }

        let mut summary = SyncSummary::default();
        let mut has_more = true;

        while has_more {
            let page = self.source.list_articles(&cursor, &filters).await?;
            if page.articles.is_empty() {
                debug!("Empty page, nothing left to sync");
                break;
            }

            for article in &page.articles {
                match self
                    .sync_article(&vault, &renderer, &mut index, article)
                    .await
                {
                    Ok(outcome) => summary.record(outcome),
                    Err(e) => {
                        warn!("Failed to sync card {} ({}): {}", article.id, article.title, e);
                        summary.errors += 1;
                    }
                }
            }

            if let Some(last) = page.articles.last() {
                cursor = Cursor::after(last);
                vault.save_index(&index)?;

                let now = Utc::now();
                let ttl = self.settings.lease_ttl();
                self.settings
                    .checkpoint
                    .advance(&last.id, &last.update_time, now);
                if let Some(lease) = self.settings.lease.as_mut() {
                    lease.renew(now, ttl);
                }
                self.persist()?;
            }

            summary.pages += 1;
            info!(
                "Page {} done ({} cards), {}",
                summary.pages,
                page.articles.len(),
                summary
            );
            has_more = page.has_more;
        }

        self.settings.checkpoint.clear_cursor();
        self.settings.checkpoint.touch(Utc::now());
        Ok(summary)
    }

    async fn sync_article(
        &self,
        vault: &Vault,
        renderer: &TemplateRenderer,
        index: &mut NoteIndex,
        article: &Article,
    ) -> Result<ArticleOutcome> {
        let Some(content) = self.source.get_article_content(&article.id).await? else {
            debug!("No content for card {}, skipping", article.id);
            return Ok(ArticleOutcome::Unavailable);
        };

        let mut article = article.clone();
        article.content = Some(content);

        let file_name = renderer.render_filename(&self.settings.filename_template, &article);
        let path = vault.note_path(&file_name);

        if let Some(existing) = vault.find_existing(index, &article.id, &path)? {
            debug!(
                "Card {} already synced to {}",
                article.id,
                existing.display()
            );
            vault.record(index, &article.id, &existing);
            return Ok(ArticleOutcome::Skipped);
        }

        let front_matter =
            renderer.render_front_matter(&self.settings.front_matter_variables, &article)?;
        let body = renderer.render_content(&self.settings.content_template, &article)?;
        vault.write_note(&path, &compose_note(&front_matter, &body))?;
        vault.record(index, &article.id, &path);

        debug!("Synced card {} to {}", article.id, path.display());
        Ok(ArticleOutcome::Synced)
    }
}
