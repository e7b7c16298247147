//! Per-session turn serialisation.
//!
//! Two triggers for the same session must not interleave: the second waits
//! until the first has persisted.  Inside one process a `Semaphore(1)` per
//! (store, session) pair queues the turns; across processes an `fs2`
//! advisory lock on `<store dir>/.locks/<store>.<session>.lock` does.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use ct_domain::error::{Error, Result};

/// Held for the whole turn; dropping it releases both locks.
pub struct SessionPermit {
    _file: File,
    _permit: OwnedSemaphorePermit,
}

/// Lock file guarding one session of one store.
pub fn session_lock_path(store_path: &Path, session_key: &str) -> PathBuf {
    let dir = store_path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let store = store_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sessions".into());
    let session: String = session_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    dir.join(".locks").join(format!("{store}.{session}.lock"))
}

fn lock_file(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        self.locks
            .lock()
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Wait for exclusive use of `session_key` in `store_path`, first among
    /// this process's turns, then against other processes.
    pub async fn acquire(&self, store_path: &Path, session_key: &str) -> Result<SessionPermit> {
        let started = Instant::now();
        let key = format!("{}|{session_key}", store_path.display());
        let permit = self
            .semaphore(&key)
            .acquire_owned()
            .await
            .map_err(|_| Error::Other(format!("session lock closed: {session_key}")))?;

        let path = session_lock_path(store_path, session_key);
        let file = tokio::task::spawn_blocking({
            let path = path.clone();
            move || lock_file(&path)
        })
        .await
        .map_err(|e| Error::Other(format!("session lock task failed: {e}")))?
        .map_err(|e| Error::StoreUnavailable {
            path: path.display().to_string(),
            message: format!("locking session: {e}"),
        })?;

        let waited_ms = started.elapsed().as_millis() as u64;
        if waited_ms > 0 {
            tracing::debug!(session_key, waited_ms, "session lock acquired after wait");
        }
        Ok(SessionPermit {
            _file: file,
            _permit: permit,
        })
    }

    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget sessions nobody holds or waits on.  A permit or a waiter keeps
    /// its own reference to the semaphore, so a count of one means idle.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}
