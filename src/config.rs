use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, trace};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    parse_list, ArticleFilters, ContentType, Filter, Result, StatusFilter, SyncError, TagChoice,
};

/// Upper bounds for the numeric settings
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 10 * 60;
pub const MAX_LEASE_MINUTES: u64 = 24 * 60;

pub const DEFAULT_FILENAME_TEMPLATE: &str = "{{ title }}-{{ create_time }}";

pub const DEFAULT_CONTENT_TEMPLATE: &str = r#"# {{ title }}

{{ description }}

[Read in Cubox]({{ cubox_url }})
[Read Original]({{ url }})

---

{% if highlights_count > 0 %}
## Annotations

{% for highlight in highlights %}
> {{ highlight.text }}

{% if highlight.note %}
{{ highlight.note }}
{% endif %}
[Link]({{ highlight.cubox_url }})

{% endfor %}
{% endif %}"#;

/// Where the sync cursor stood when the last page was durably written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCheckpoint {
    /// Identifier of the last article of the last completed page
    pub last_card_id: Option<String>,
    /// Update time of that article, paired with the id as the cursor
    pub last_card_update_time: Option<String>,
    /// Wall-clock time of the last completed page; never moves backwards
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncCheckpoint {
    pub fn is_empty(&self) -> bool {
        self.last_card_id.is_none() && self.last_card_update_time.is_none()
    }

    /// Moves the cursor forward and stamps the sync time
    pub fn advance(&mut self, card_id: &str, update_time: &str, now: DateTime<Utc>) {
        self.last_card_id = Some(card_id.to_string());
        self.last_card_update_time = Some(update_time.to_string());
        self.touch(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_sync_time = Some(match self.last_sync_time {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// Forgets the cursor after a complete pass, keeping the sync time
    pub fn clear_cursor(&mut self) {
        self.last_card_id = None;
        self.last_card_update_time = None;
    }
}

/// Expiring marker that a sync run is in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLease {
    /// Process that acquired the lease
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SyncLease {
    pub fn new(holder: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            holder,
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn renew(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = now + ttl;
    }
}

/// Application settings, persisted wholesale as one JSON document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Cubox server domain (cubox.cc or cubox.pro)
    pub domain: String,

    /// API key created in the Cubox web app
    pub api_key: String,

    /// Root of the notes vault
    pub vault_path: PathBuf,

    /// Folder inside the vault that receives synced notes
    pub target_folder: String,

    pub folder_filter: Filter<String>,
    pub type_filter: Filter<ContentType>,
    pub status_filter: StatusFilter,
    pub tag_filter: Filter<TagChoice>,

    pub filename_template: String,

    /// Front matter variables, optionally aliased as `name::alias`
    pub front_matter_variables: Vec<String>,

    pub content_template: String,

    /// Date pattern in `yyyy-MM-dd HH:mm` style
    pub date_format: String,

    /// Minutes between automatic syncs; 0 disables the timer
    pub sync_interval_minutes: u64,

    /// Per-request timeout for API calls
    pub request_timeout_secs: u64,

    /// How long a sync lease stays valid without being renewed
    pub lease_minutes: u64,

    pub checkpoint: SyncCheckpoint,

    /// Present while a sync run holds the re-entrancy lease
    pub lease: Option<SyncLease>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            domain: String::new(),
            api_key: String::new(),
            vault_path: PathBuf::from("."),
            target_folder: "Cubox".to_string(),
            folder_filter: Filter::All,
            type_filter: Filter::All,
            status_filter: StatusFilter::All,
            tag_filter: Filter::All,
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            front_matter_variables: ["id", "cubox_url", "url", "tags"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            content_template: DEFAULT_CONTENT_TEMPLATE.to_string(),
            date_format: "yyyy-MM-dd".to_string(),
            sync_interval_minutes: 30,
            request_timeout_secs: 30,
            lease_minutes: 30,
            checkpoint: SyncCheckpoint::default(),
            lease: None,
        }
    }
}

impl SyncSettings {
    /// Directory that receives the synced notes
    pub fn output_dir(&self) -> PathBuf {
        self.vault_path.join(&self.target_folder)
    }

    pub fn filters(&self) -> ArticleFilters {
        ArticleFilters {
            folders: self.folder_filter.clone(),
            types: self.type_filter.clone(),
            statuses: self.status_filter,
            tags: self.tag_filter.clone(),
        }
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::minutes(self.lease_minutes.clamp(1, MAX_LEASE_MINUTES) as i64)
    }

    /// A lease that has not expired yet
    pub fn active_lease(&self, now: DateTime<Utc>) -> Option<&SyncLease> {
        self.lease.as_ref().filter(|lease| !lease.is_expired(now))
    }

    /// Updates a single setting from its textual form
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parse_u64 = |value: &str, min: u64, max: u64| -> Result<u64> {
            let number = value.trim().parse::<u64>().map_err(|e| SyncError::InvalidFormat {
                message: format!("Invalid number for {}: {}", key, e),
            })?;
            if !(min..=max).contains(&number) {
                return Err(SyncError::ConfigError {
                    message: format!("{} must be between {} and {}", key, min, max),
                });
            }
            Ok(number)
        };

        match key {
            "domain" => self.domain = value.trim().to_string(),
            "api_key" => self.api_key = value.trim().to_string(),
            "vault_path" => self.vault_path = PathBuf::from(value.trim()),
            "target_folder" => self.target_folder = value.trim().to_string(),
            "filename_template" => self.filename_template = value.to_string(),
            "front_matter_variables" => {
                self.front_matter_variables = parse_list(Some(value.to_string()))
            }
            "content_template" => self.content_template = value.to_string(),
            "content_template_file" => {
                self.content_template = fs::read_to_string(value.trim())?;
            }
            "date_format" => self.date_format = value.to_string(),
            "sync_interval_minutes" => {
                self.sync_interval_minutes = parse_u64(value, 0, MAX_SYNC_INTERVAL_MINUTES)?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = parse_u64(value, 1, MAX_REQUEST_TIMEOUT_SECS)?
            }
            "lease_minutes" => self.lease_minutes = parse_u64(value, 1, MAX_LEASE_MINUTES)?,
            _ => {
                return Err(SyncError::ConfigError {
                    message: format!("Unknown setting: {}", key),
                })
            }
        }

        Ok(())
    }
}

/// Loads and persists [`SyncSettings`] as a JSON file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config dir>/cubox-sync/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("cubox-sync").join("settings.json"))
            .ok_or_else(|| SyncError::ConfigError {
                message: "Could not determine the configuration directory".to_string(),
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings, falling back to defaults when no file exists yet
    pub fn load(&self) -> Result<SyncSettings> {
        if !self.path.exists() {
            debug!(
                "No settings file at {}, using defaults",
                self.path.display()
            );
            return Ok(SyncSettings::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            error!("Failed to read settings {}: {}", self.path.display(), e);
            SyncError::Io(e)
        })?;
        let settings = serde_json::from_str(&content)?;
        trace!("Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    /// Writes settings through a temporary file and atomically replaces the old one
    pub fn save(&self, settings: &SyncSettings) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !dir.exists() {
            debug!("Creating settings directory: {}", dir.display());
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create settings directory: {}", e);
                SyncError::DirectoryError { path: dir.clone() }
            })?;
        }

        let json = serde_json::to_string_pretty(settings)?;
        let mut temp_file = NamedTempFile::new_in(&dir)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&self.path).map_err(|e| {
            error!(
                "Failed to persist settings {}: {}",
                self.path.display(),
                e.error
            );
            SyncError::Io(e.error)
        })?;

        trace!("Settings saved to {}", self.path.display());
        Ok(())
    }

    /// Restores the default settings on disk
    pub fn reset(&self) -> Result<SyncSettings> {
        let settings = SyncSettings::default();
        self.save(&settings)?;
        info!("Settings reset to defaults");
        Ok(settings)
    }
}
