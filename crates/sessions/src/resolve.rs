//! Session resolution for isolated turns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use ct_domain::error::Result;
use ct_domain::trace::TraceEvent;

use crate::lifecycle::LifecycleManager;
use crate::store::{SessionEntry, SessionStore};

/// The session a turn runs in, as resolved at turn start.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub store_path: PathBuf,
    pub session_key: String,
    /// Working copy of the entry.  Written back once at the end of the turn.
    pub entry: SessionEntry,
    pub is_new_session: bool,
    /// `system_sent` as loaded, before this turn changes anything.
    pub system_sent: bool,
}

/// Load the entry for `session_key`, or mint a new one when it is missing
/// or stale.  Never writes.
pub async fn resolve_session(
    store: &dyn SessionStore,
    store_path: &Path,
    session_key: &str,
    lifecycle: &LifecycleManager,
    now: DateTime<Utc>,
) -> Result<SessionContext> {
    let sessions = store.load(store_path).await?;

    let (entry, is_new_session) = match sessions.get(session_key) {
        Some(existing) => match lifecycle.should_reset(existing, now) {
            Some(reason) => {
                let fresh = existing.rotated(now);
                tracing::info!(
                    session_key,
                    old_session_id = %existing.session_id,
                    new_session_id = %fresh.session_id,
                    reason = %reason,
                    "session reset"
                );
                TraceEvent::SessionReset {
                    session_key: session_key.to_owned(),
                    old_session_id: existing.session_id.clone(),
                    new_session_id: fresh.session_id.clone(),
                    reason: reason.to_string(),
                }
                .emit();
                (fresh, true)
            }
            None => (existing.clone(), false),
        },
        None => (SessionEntry::new(now), true),
    };

    TraceEvent::SessionResolved {
        session_key: session_key.to_owned(),
        session_id: entry.session_id.clone(),
        is_new: is_new_session,
    }
    .emit();

    Ok(SessionContext {
        store_path: store_path.to_path_buf(),
        session_key: session_key.to_owned(),
        system_sent: entry.system_sent,
        entry,
        is_new_session,
    })
}
