//! Cron job definitions as handed to the isolated turn runner.

use serde::{Deserialize, Serialize};

use crate::channel::ChannelSelector;

/// A scheduled job whose turn runs in its own isolated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Agent that owns the turn.  Falls back to the configured default agent.
    #[serde(default)]
    pub agent_id: Option<String>,
    pub payload: JobPayload,
    /// Explicit delivery block.  Takes precedence over the legacy payload
    /// flags when present.
    #[serde(default)]
    pub delivery: Option<JobDelivery>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPayload {
    pub message: String,
    /// Model override, `"provider/model"` or a bare model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Fallback chain override.  An explicit empty list disables fallback.
    #[serde(default)]
    pub fallbacks: Option<Vec<String>>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Skip the safety wrapper for externally sourced hook content.
    #[serde(default)]
    pub allow_unsafe_external_content: bool,

    // Legacy delivery flags.
    #[serde(default)]
    pub deliver: Option<bool>,
    #[serde(default)]
    pub channel: Option<ChannelSelector>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub best_effort_deliver: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    None,
    Announce,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDelivery {
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default)]
    pub channel: Option<ChannelSelector>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub best_effort: bool,
}

impl CronJob {
    /// Display label used in prompts and logs.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            self.name.trim()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;

    #[test]
    fn job_parses_from_toml() {
        let raw = r#"
id = "daily-digest"
name = "Daily digest"

[payload]
message = "Summarise the inbox"
model = "anthropic/claude-sonnet-4"
fallbacks = ["openai/gpt-4o"]
timeout_seconds = 120

[delivery]
mode = "announce"
channel = "discord"
to = "channel:123"
"#;
        let job: CronJob = toml::from_str(raw).unwrap();
        assert_eq!(job.label(), "Daily digest");
        assert_eq!(job.payload.fallbacks.as_deref().map(|f| f.len()), Some(1));
        let delivery = job.delivery.unwrap();
        assert_eq!(delivery.mode, DeliveryMode::Announce);
        assert_eq!(
            delivery.channel,
            Some(ChannelSelector::Channel(ChannelKind::Discord))
        );
    }

    #[test]
    fn label_falls_back_to_id() {
        let job = CronJob {
            id: "j1".into(),
            name: " ".into(),
            agent_id: None,
            payload: JobPayload::default(),
            delivery: None,
        };
        assert_eq!(job.label(), "j1");
    }
}
