use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model backends
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Provider assumed for bare model names.
    #[serde(default = "d_openai")]
    pub default_provider: String,
    /// Allowed model refs.  Entries are `"provider/model"` or
    /// `"provider/*"`.  Empty = every model is allowed.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Registered backends (data-driven: adding a backend = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Context window per model name (e.g. `"gpt-4o" = 128000`).
    #[serde(default)]
    pub context_tokens: HashMap<String, u64>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_provider: d_openai(),
            allowlist: Vec::new(),
            providers: Vec::new(),
            context_tokens: HashMap::new(),
        }
    }
}

impl ModelsConfig {
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: BackendKind,
    /// API root for `openai_compat` backends.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Env var containing the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Executable for `cli` backends.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Flag used to resume a CLI conversation (e.g. `"--resume"`).
    #[serde(default)]
    pub session_arg: Option<String>,
    /// Flag used to pass the model to a CLI backend (e.g. `"--model"`).
    #[serde(default)]
    pub model_arg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Cli,
    OpenaiCompat,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_openai() -> String {
    crate::model::DEFAULT_PROVIDER.into()
}
