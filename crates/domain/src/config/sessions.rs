use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session store file.  `{agent_id}` is replaced per agent.
    #[serde(default = "d_store_path")]
    pub store_path: String,
    /// Session reset rules.  Both disabled by default: cron sessions keep
    /// their continuity until explicitly reset.
    #[serde(default)]
    pub reset: LifecycleConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: d_store_path(),
            reset: LifecycleConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn store_path_for(&self, agent_id: &str) -> PathBuf {
        PathBuf::from(self.store_path.replace("{agent_id}", agent_id))
    }
}

/// Session lifecycle rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Daily reset hour (0–23, UTC).  `None` disables daily reset.
    #[serde(default)]
    pub daily_reset_hour: Option<u8>,

    /// Idle timeout in minutes.  If the session was last updated more than
    /// this many minutes ago, the next turn starts a fresh session.
    #[serde(default)]
    pub idle_minutes: Option<u32>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_store_path() -> String {
    "./state/sessions/{agent_id}.json".into()
}
