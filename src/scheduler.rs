// src/scheduler.rs - Periodic sync scheduler
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::{
    CuboxSource, Result, SyncError, SyncOutcome, Syncer, MAX_SYNC_INTERVAL_MINUTES,
};

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// Whether the scheduler is running
    pub is_running: bool,
    /// Minutes between automatic runs
    pub interval_minutes: u64,
    /// When the scheduler last started a run
    pub last_run_time: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// Run a sync immediately
    SyncNow,
    /// Stop the scheduler
    Stop,
}

pub struct SyncScheduler<S: CuboxSource + 'static> {
    syncer: Arc<Mutex<Syncer<S>>>,

    /// Channel to send commands to the scheduler task
    command_tx: Option<mpsc::Sender<SyncCommand>>,

    /// Handle to the scheduler task
    scheduler_task: Option<JoinHandle<()>>,

    status: Arc<Mutex<SchedulerStatus>>,
}

async fn run_once<S: CuboxSource + 'static>(
    syncer: &Arc<Mutex<Syncer<S>>>,
    status: &Arc<Mutex<SchedulerStatus>>,
    trigger: &str,
) {
    status.lock().await.last_run_time = Some(Utc::now());

    match syncer.lock().await.sync().await {
        Ok(SyncOutcome::Completed(summary)) => info!("{} sync completed: {}", trigger, summary),
        Ok(SyncOutcome::AlreadyRunning) => info!("{} sync skipped, another run is active", trigger),
        Err(e) => error!("{} sync failed: {}", trigger, e),
    }
}

impl<S: CuboxSource + 'static> SyncScheduler<S> {
    pub fn new(syncer: Arc<Mutex<Syncer<S>>>) -> Self {
        Self {
            syncer,
            command_tx: None,
            scheduler_task: None,
            status: Arc::new(Mutex::new(SchedulerStatus::default())),
        }
    }

    /// Start syncing every `interval_minutes`; 0 only serves manual commands
    pub async fn start(&mut self, interval_minutes: u64) -> Result<()> {
        if self.scheduler_task.is_some() {
            debug!("Sync scheduler is already running");
            return Ok(());
        }

        info!(
            "Starting sync scheduler (interval: {} minutes)",
            interval_minutes
        );

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = Some(command_tx);

        let syncer = Arc::clone(&self.syncer);
        let status = Arc::clone(&self.status);

        let task = tokio::spawn(async move {
            let minutes = interval_minutes.clamp(1, MAX_SYNC_INTERVAL_MINUTES);
            let period = Duration::from_secs(minutes * 60);
            let mut interval = time::interval(period);
            interval.tick().await; // Initial tick

            loop {
                tokio::select! {
                    _ = interval.tick(), if interval_minutes > 0 => {
                        run_once(&syncer, &status, "Scheduled").await;
                    }
                    cmd = command_rx.recv() => match cmd {
                        Some(SyncCommand::SyncNow) => run_once(&syncer, &status, "Manual").await,
                        Some(SyncCommand::Stop) | None => {
                            info!("Sync scheduler stopping...");
                            break;
                        }
                    }
                }
            }
        });

        self.scheduler_task = Some(task);
        {
            let mut status = self.status.lock().await;
            status.is_running = true;
            status.interval_minutes = interval_minutes;
        }

        Ok(())
    }

    /// Stop the scheduler if it's running
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.scheduler_task.take() {
            if let Some(tx) = self.command_tx.take() {
                if let Err(e) = tx.send(SyncCommand::Stop).await {
                    error!("Failed to send stop command to sync scheduler: {}", e);
                }
            }

            // Wait for the task to complete
            if let Err(e) = task.await {
                let error_mgs = format!("Failed to stop sync scheduler: {}", e);
                error!("{}", error_mgs);
                return Err(SyncError::ApplicationError { message: error_mgs });
            }

            self.status.lock().await.is_running = false;
            info!("Sync scheduler stopped");
        } else {
            debug!("Sync scheduler is not running");
        }

        Ok(())
    }

    /// Queue a sync immediately, regardless of the schedule
    pub async fn sync_now(&self) -> Result<()> {
        let Some(tx) = &self.command_tx else {
            return Err(SyncError::ApplicationError {
                message: "Sync scheduler is not running".to_string(),
            });
        };

        tx.send(SyncCommand::SyncNow)
            .await
            .map_err(|e| SyncError::ApplicationError {
                message: format!("Failed to send sync command: {}", e),
            })
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use crate::{
        ArticleFilters, ArticlePage, Cursor, Folder, SettingsStore, SyncSettings, Tag,
    };

    #[derive(Default)]
    struct CountingSource {
        pages: AtomicUsize,
    }

    #[async_trait]
    impl CuboxSource for CountingSource {
        async fn list_articles(&self, _: &Cursor, _: &ArticleFilters) -> Result<ArticlePage> {
            self.pages.fetch_add(1, Ordering::SeqCst);
            Ok(ArticlePage::default())
        }

        async fn get_article_content(&self, _: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn list_folders(&self) -> Result<Vec<Folder>> {
            Ok(Vec::new())
        }

        async fn list_tags(&self) -> Result<Vec<Tag>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn manual_command_runs_a_sync() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut settings = SyncSettings::default();
        settings.vault_path = dir.path().to_path_buf();
        store.save(&settings).unwrap();

        let syncer = Arc::new(Mutex::new(Syncer::new(CountingSource::default(), store)));
        let mut scheduler = SyncScheduler::new(Arc::clone(&syncer));

        assert!(scheduler.sync_now().await.is_err());

        scheduler.start(0).await.unwrap();
        assert!(scheduler.get_status().await.is_running);
        scheduler.sync_now().await.unwrap();
        scheduler.stop().await.unwrap();

        let status = scheduler.get_status().await;
        assert!(!status.is_running);
        assert!(status.last_run_time.is_some());
        assert_eq!(syncer.lock().await.source().pages.load(Ordering::SeqCst), 1);
    }
}
