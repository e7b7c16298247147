use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    /// Agent used when a job does not name one.  Falls back to the first
    /// agent in `list` (sorted by id), then to `"main"`.
    #[serde(default)]
    pub default_agent: Option<String>,
    /// Settings every agent inherits.
    #[serde(default)]
    pub defaults: AgentDefaults,
    /// Per-agent overrides (key = agent_id).
    #[serde(default)]
    pub list: HashMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    /// Format: "provider_id/model_name" (bare names use `models.default_provider`).
    #[serde(default)]
    pub model: Option<String>,
    /// Ordered fallback models tried after the primary.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default = "d_workspace")]
    pub workspace: PathBuf,
    /// Per-attempt wall-clock limit.
    #[serde(default = "d_600")]
    pub timeout_seconds: u64,
    /// Longest acknowledgement text still treated as a bare heartbeat.
    #[serde(default = "d_300")]
    pub heartbeat_ack_max_chars: usize,
    /// IANA zone used for the "Current time" prompt line.
    #[serde(default)]
    pub user_timezone: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub context_tokens: Option<u64>,
    /// Skill names to expose.  `None` = every skill in the workspace.
    #[serde(default)]
    pub skills: Option<Vec<String>>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: None,
            fallbacks: Vec::new(),
            workspace: d_workspace(),
            timeout_seconds: 600,
            heartbeat_ack_max_chars: 300,
            user_timezone: None,
            thinking: None,
            context_tokens: None,
            skills: None,
        }
    }
}

/// Per-agent overrides.  Every unset field inherits from [`AgentDefaults`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub model: Option<String>,
    /// `Some(vec![])` disables fallback for this agent.
    #[serde(default)]
    pub fallbacks: Option<Vec<String>>,
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub heartbeat_ack_max_chars: Option<usize>,
    #[serde(default)]
    pub user_timezone: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub context_tokens: Option<u64>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_workspace() -> PathBuf {
    PathBuf::from("./workspace")
}
fn d_600() -> u64 {
    600
}
fn d_300() -> usize {
    300
}
