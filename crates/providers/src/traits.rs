use std::path::PathBuf;

use ct_domain::error::Result;
use ct_domain::model::{ModelRef, ModelStatus};
use ct_domain::payload::AgentRunResult;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything an agent backend needs for one turn.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub run_id: String,
    pub session_id: String,
    pub session_key: String,
    /// The user-turn message, already shaped (cron header, time line,
    /// safety wrapper).
    pub prompt: String,
    /// Bootstrap system prompt.  Present only until the session has sent it.
    pub system_prompt: Option<String>,
    pub thinking: Option<String>,
    pub workspace_dir: PathBuf,
    /// Backend session to resume (CLI backends only).
    pub cli_session_id: Option<String>,
}

impl PromptContext {
    /// System prompt and message joined for backends that take one input.
    pub fn combined_input(&self) -> String {
        match self.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(system) => format!("{system}\n\n{}", self.prompt),
            None => self.prompt.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One execution strategy for agent turns.
///
/// Implementations run the agent against a single model and return its
/// ordered payloads.  Failures are [`ct_domain::error::Error::Provider`] or
/// [`ct_domain::error::Error::Timeout`]; the caller decides whether to fall
/// back.
#[async_trait::async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        model: &ModelRef,
        ctx: &PromptContext,
        timeout_ms: u64,
    ) -> Result<AgentRunResult>;
}

/// Allow-list and strategy lookup for model references.
pub trait ModelStatusProvider: Send + Sync {
    fn status(&self, model: &ModelRef) -> ModelStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_input_includes_system_once() {
        let mut ctx = PromptContext {
            prompt: "hello".into(),
            system_prompt: Some("be brief".into()),
            ..Default::default()
        };
        assert_eq!(ctx.combined_input(), "be brief\n\nhello");
        ctx.system_prompt = None;
        assert_eq!(ctx.combined_input(), "hello");
    }
}
