//! Effective per-agent settings, resolved from config defaults and overrides.

use std::path::PathBuf;

use crate::config::Config;
use crate::model::DEFAULT_PROVIDER;

/// Agent used when neither the job nor the config names one.
pub const DEFAULT_AGENT_ID: &str = "main";
/// Context window recorded when no model-specific value is configured.
pub const DEFAULT_CONTEXT_TOKENS: u64 = 128_000;

/// Seconds to milliseconds, saturating for absurdly large job values.
pub fn timeout_ms_from_secs(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

/// Everything a turn needs to know about its agent, already merged.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub agent_id: String,
    pub model: Option<String>,
    /// `Some(vec![])` means fallback is explicitly disabled.
    pub fallbacks: Option<Vec<String>>,
    pub default_provider: String,
    pub skills_filter: Option<Vec<String>>,
    pub workspace_dir: PathBuf,
    pub timeout_ms: u64,
    pub heartbeat_ack_max_chars: usize,
    pub thinking_default: Option<String>,
    pub user_timezone: Option<String>,
    pub context_tokens: Option<u64>,
    pub session_store_path: PathBuf,
    pub hooks_gmail_model: Option<String>,
}

/// Source of agent settings for the turn runner.
pub trait AgentConfigProvider: Send + Sync {
    fn default_agent_id(&self) -> String;
    fn agent_settings(&self, agent_id: &str) -> AgentSettings;
    /// Context window for a model, when known.
    fn lookup_context_tokens(&self, model: &str) -> Option<u64>;
}

impl AgentConfigProvider for Config {
    fn default_agent_id(&self) -> String {
        if let Some(id) = &self.agents.default_agent {
            return id.clone();
        }
        let mut ids: Vec<&String> = self.agents.list.keys().collect();
        ids.sort();
        ids.first()
            .map(|id| (*id).clone())
            .unwrap_or_else(|| DEFAULT_AGENT_ID.into())
    }

    fn agent_settings(&self, agent_id: &str) -> AgentSettings {
        let defaults = &self.agents.defaults;
        let agent = self.agents.list.get(agent_id).cloned().unwrap_or_default();
        let default_provider = if self.models.default_provider.is_empty() {
            DEFAULT_PROVIDER.to_owned()
        } else {
            self.models.default_provider.clone()
        };

        let fallbacks = match agent.fallbacks {
            Some(list) => Some(list),
            None if !defaults.fallbacks.is_empty() => Some(defaults.fallbacks.clone()),
            None => None,
        };

        AgentSettings {
            agent_id: agent_id.to_owned(),
            model: agent.model.or_else(|| defaults.model.clone()),
            fallbacks,
            default_provider,
            skills_filter: agent.skills.or_else(|| defaults.skills.clone()),
            workspace_dir: agent
                .workspace
                .unwrap_or_else(|| defaults.workspace.clone()),
            timeout_ms: timeout_ms_from_secs(
                agent.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            ),
            heartbeat_ack_max_chars: agent
                .heartbeat_ack_max_chars
                .unwrap_or(defaults.heartbeat_ack_max_chars),
            thinking_default: agent.thinking.or_else(|| defaults.thinking.clone()),
            user_timezone: agent
                .user_timezone
                .or_else(|| defaults.user_timezone.clone()),
            context_tokens: agent.context_tokens.or(defaults.context_tokens),
            session_store_path: self.session.store_path_for(agent_id),
            hooks_gmail_model: self.hooks.gmail.model.clone(),
        }
    }

    fn lookup_context_tokens(&self, model: &str) -> Option<u64> {
        self.models.context_tokens.get(model).copied()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    #[test]
    fn agent_overrides_win_over_defaults() {
        let mut cfg = Config::default();
        cfg.agents.defaults.model = Some("openai/gpt-4o".into());
        cfg.agents.defaults.fallbacks = vec!["anthropic/claude-sonnet-4".into()];
        cfg.agents.list.insert(
            "ops".into(),
            AgentConfig {
                model: Some("anthropic/claude-opus-4".into()),
                fallbacks: Some(vec![]),
                timeout_seconds: Some(30),
                ..Default::default()
            },
        );

        let s = cfg.agent_settings("ops");
        assert_eq!(s.model.as_deref(), Some("anthropic/claude-opus-4"));
        assert_eq!(s.fallbacks, Some(vec![]));
        assert_eq!(s.timeout_ms, 30_000);
        assert_eq!(s.heartbeat_ack_max_chars, 300);
        assert_eq!(
            s.session_store_path,
            PathBuf::from("./state/sessions/ops.json")
        );

        let s = cfg.agent_settings("unknown");
        assert_eq!(s.model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(s.fallbacks, Some(vec!["anthropic/claude-sonnet-4".to_string()]));
        assert_eq!(s.timeout_ms, 600_000);
    }

    #[test]
    fn huge_timeout_saturates() {
        let mut cfg = Config::default();
        cfg.agents.list.insert(
            "slow".into(),
            AgentConfig {
                timeout_seconds: Some(u64::MAX / 100),
                ..Default::default()
            },
        );
        assert_eq!(cfg.agent_settings("slow").timeout_ms, u64::MAX);
        assert_eq!(timeout_ms_from_secs(45), 45_000);
    }

    #[test]
    fn no_fallbacks_anywhere_is_none() {
        let cfg = Config::default();
        assert_eq!(cfg.agent_settings("main").fallbacks, None);
    }

    #[test]
    fn default_agent_resolution() {
        let mut cfg = Config::default();
        assert_eq!(cfg.default_agent_id(), "main");
        cfg.agents.list.insert("zeta".into(), AgentConfig::default());
        cfg.agents.list.insert("alpha".into(), AgentConfig::default());
        assert_eq!(cfg.default_agent_id(), "alpha");
        cfg.agents.default_agent = Some("zeta".into());
        assert_eq!(cfg.default_agent_id(), "zeta");
    }
}
