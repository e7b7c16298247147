mod agents;
mod delivery;
mod models;
mod sessions;

pub use agents::*;
pub use delivery::*;
pub use models::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::model::ModelRef;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let default_provider = self.models.default_provider.as_str();

        let check_model = |errors: &mut Vec<ConfigError>, field: String, raw: &str| {
            if ModelRef::parse(raw, default_provider).is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field,
                    message: format!("invalid model reference {raw:?}"),
                });
            }
        };

        if let Some(model) = &self.agents.defaults.model {
            check_model(&mut errors, "agents.defaults.model".into(), model);
        }
        for (i, fb) in self.agents.defaults.fallbacks.iter().enumerate() {
            check_model(&mut errors, format!("agents.defaults.fallbacks[{i}]"), fb);
        }
        let mut agent_ids: Vec<&String> = self.agents.list.keys().collect();
        agent_ids.sort();
        for id in agent_ids {
            let agent = &self.agents.list[id];
            if let Some(model) = &agent.model {
                check_model(&mut errors, format!("agents.list.{id}.model"), model);
            }
            for (i, fb) in agent.fallbacks.iter().flatten().enumerate() {
                check_model(&mut errors, format!("agents.list.{id}.fallbacks[{i}]"), fb);
            }
            if agent.timeout_seconds == Some(0) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("agents.list.{id}.timeout_seconds"),
                    message: "timeout must be greater than 0".into(),
                });
            }
        }
        if let Some(model) = &self.hooks.gmail.model {
            check_model(&mut errors, "hooks.gmail.model".into(), model);
        }

        if self.agents.defaults.timeout_seconds == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "agents.defaults.timeout_seconds".into(),
                message: "timeout must be greater than 0".into(),
            });
        }

        if let Some(default_agent) = &self.agents.default_agent {
            if !self.agents.list.is_empty() && !self.agents.list.contains_key(default_agent) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "agents.default_agent".into(),
                    message: format!("agent {default_agent:?} is not defined in agents.list"),
                });
            }
        }

        // Warn when no backends are configured.
        if self.models.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "models.providers".into(),
                message: "no model providers configured".into(),
            });
        }

        let mut seen = HashSet::new();
        for (i, provider) in self.models.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("models.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            } else if !seen.insert(provider.id.to_ascii_lowercase()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("models.providers[{i}].id"),
                    message: format!("duplicate provider id {:?}", provider.id),
                });
            }
            match provider.kind {
                BackendKind::Cli => {
                    if provider.command.as_deref().map_or(true, str::is_empty) {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("models.providers[{i}].command"),
                            message: "cli providers need a command".into(),
                        });
                    }
                }
                BackendKind::OpenaiCompat => {
                    if provider.base_url.as_deref().map_or(true, str::is_empty) {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("models.providers[{i}].base_url"),
                            message: "provider base_url must not be empty".into(),
                        });
                    }
                }
            }
        }

        for (i, entry) in self.models.allowlist.iter().enumerate() {
            if !entry.contains('/') {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("models.allowlist[{i}]"),
                    message: format!(
                        "{entry:?} has no provider; it will match as {default_provider}/{entry}"
                    ),
                });
            }
        }

        if let Some(hour) = self.session.reset.daily_reset_hour {
            if hour > 23 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "session.reset.daily_reset_hour".into(),
                    message: "hour must be between 0 and 23".into(),
                });
            }
        }

        for (kind, channel) in self.channels.configured() {
            if channel.webhook_url.trim().is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("channels.{kind}.webhook_url"),
                    message: "webhook_url must not be empty".into(),
                });
            }
        }

        errors
    }
}
