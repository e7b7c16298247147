//! Durable session store.
//!
//! A store file maps session keys to [`SessionEntry`] values.  The default
//! [`JsonSessionStore`] keeps one pretty-printed JSON object per file and
//! replaces it atomically on every write.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use ct_domain::error::{Error, Result};
use ct_domain::payload::Usage;
use ct_domain::snapshot::SkillSnapshot;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single durable session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether the bootstrap system prompt has been sent to the model.
    /// Flips false→true once and never reverts while the session lives.
    #[serde(default)]
    pub system_sent: bool,
    #[serde(default)]
    pub skills_snapshot_version: Option<u64>,
    #[serde(default)]
    pub skills_snapshot: Option<SkillSnapshot>,
    /// Runtime provider/model of the last successful turn.
    #[serde(default)]
    pub model_provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context_tokens: Option<u64>,
    #[serde(default)]
    pub thinking_level: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Backend session ids for CLI providers (key = provider id).
    #[serde(default)]
    pub cli_session_ids: HashMap<String, String>,
    #[serde(default)]
    pub last_channel: Option<String>,
    #[serde(default)]
    pub last_to: Option<String>,
    #[serde(default)]
    pub last_account_id: Option<String>,
    #[serde(default)]
    pub last_run_status: Option<RunStatus>,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

impl SessionEntry {
    /// A fresh session with a new id and nothing sent yet.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            system_sent: false,
            skills_snapshot_version: None,
            skills_snapshot: None,
            model_provider: None,
            model: None,
            context_tokens: None,
            thinking_level: None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            cli_session_ids: HashMap::new(),
            last_channel: None,
            last_to: None,
            last_account_id: None,
            last_run_status: None,
            last_error: None,
        }
    }

    /// Fresh session replacing this one.  Delivery routing survives the reset.
    pub fn rotated(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_channel: self.last_channel.clone(),
            last_to: self.last_to.clone(),
            last_account_id: self.last_account_id.clone(),
            ..Self::new(now)
        }
    }

    /// Add one turn's usage to the cumulative counters.
    pub fn record_usage(&mut self, usage: &Usage) {
        if !usage.has_nonzero_usage() {
            return;
        }
        self.input_tokens += usage.input;
        self.output_tokens += usage.output;
        self.total_tokens += usage.derived_total();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable key → entry storage, addressed by store path.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Load every entry in the store.  A missing store is empty; an
    /// unreadable one is [`Error::StoreUnavailable`].
    async fn load(&self, store_path: &Path) -> Result<HashMap<String, SessionEntry>>;

    /// Insert or replace one entry.  Failures are [`Error::Persist`].
    async fn update(&self, store_path: &Path, session_key: &str, entry: SessionEntry) -> Result<()>;
}

/// Session store backed by one JSON file per store path.
///
/// Writes hold an exclusive `fs2` lock on `<store>.lock` across the whole
/// read-modify-write, so concurrent writers (in this process or another)
/// never drop each other's entries.  The new file is written to a temp file
/// in the same directory and renamed over the store.
#[derive(Debug, Default)]
pub struct JsonSessionStore;

impl JsonSessionStore {
    pub fn new() -> Self {
        Self
    }

    fn read_file(store_path: &Path) -> std::result::Result<HashMap<String, SessionEntry>, String> {
        match std::fs::read_to_string(store_path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| format!("malformed store: {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn write_entry(store_path: &Path, session_key: &str, entry: SessionEntry) -> Result<()> {
        let dir = store_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Persist(format!("creating {}: {e}", dir.display())))?;

        let lock_path = lock_path(store_path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| Error::Persist(format!("opening {}: {e}", lock_path.display())))?;
        lock.lock_exclusive()
            .map_err(|e| Error::Persist(format!("locking {}: {e}", lock_path.display())))?;

        let mut sessions = Self::read_file(store_path).map_err(Error::Persist)?;
        sessions.insert(session_key.to_owned(), entry);
        let json = serde_json::to_string_pretty(&sessions)
            .map_err(|e| Error::Persist(format!("serializing sessions: {e}")))?;

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| Error::Persist(format!("creating temp file in {}: {e}", dir.display())))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::Persist(format!("writing {}: {e}", tmp.path().display())))?;
        tmp.persist(store_path)
            .map_err(|e| Error::Persist(format!("replacing {}: {}", store_path.display(), e.error)))?;
        // Lock released when `lock` is dropped.
        Ok(())
    }
}

/// Write lock guarding a store file.
fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[async_trait::async_trait]
impl SessionStore for JsonSessionStore {
    async fn load(&self, store_path: &Path) -> Result<HashMap<String, SessionEntry>> {
        let path = store_path.to_path_buf();
        let sessions = tokio::task::spawn_blocking(move || Self::read_file(&path))
            .await
            .map_err(|e| e.to_string())
            .and_then(|read| read)
            .map_err(|message| Error::StoreUnavailable {
                path: store_path.display().to_string(),
                message,
            })?;
        tracing::debug!(
            sessions = sessions.len(),
            path = %store_path.display(),
            "session store loaded"
        );
        Ok(sessions)
    }

    async fn update(&self, store_path: &Path, session_key: &str, entry: SessionEntry) -> Result<()> {
        let path = store_path.to_path_buf();
        let key = session_key.to_owned();
        tokio::task::spawn_blocking(move || Self::write_entry(&path, &key, entry))
            .await
            .map_err(|e| Error::Persist(format!("store write task failed: {e}")))?
    }
}
