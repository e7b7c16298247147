//! Agent run output: ordered payloads plus run metadata.

use serde::{Deserialize, Serialize};

/// One unit of agent output.  Order within a run is significant: the last
/// deliverable payload is the one that gets sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    /// Channel-specific structured content (cards, embeds, buttons).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<serde_json::Value>,
    /// Reasoning or tool chatter never meant for the end user.
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub is_error: bool,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Trimmed text, `None` when absent or blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn has_media(&self) -> bool {
        self.media_urls.iter().any(|u| !u.trim().is_empty())
    }

    pub fn has_channel_data(&self) -> bool {
        match &self.channel_data {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }
}

/// Token usage reported by one agent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
    /// Provider-reported total; `0` when the provider does not report one.
    #[serde(default)]
    pub total: u64,
}

impl Usage {
    pub fn has_nonzero_usage(&self) -> bool {
        self.input > 0
            || self.output > 0
            || self.cache_read > 0
            || self.cache_write > 0
            || self.total > 0
    }

    /// Total tokens for session accounting: the reported total when present,
    /// otherwise the sum of the parts.
    pub fn derived_total(&self) -> u64 {
        if self.total > 0 {
            self.total
        } else {
            self.input + self.output + self.cache_read + self.cache_write
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMeta {
    /// Backend-side session id (CLI agents report theirs here).
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub agent_meta: AgentMeta,
}

/// Result of a single successful agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    #[serde(default)]
    pub payloads: Vec<Payload>,
    #[serde(default)]
    pub meta: RunMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total_prefers_reported() {
        let u = Usage {
            input: 10,
            output: 20,
            total: 35,
            ..Default::default()
        };
        assert_eq!(u.derived_total(), 35);

        let u = Usage {
            input: 10,
            output: 20,
            ..Default::default()
        };
        assert_eq!(u.derived_total(), 30);
        assert!(u.has_nonzero_usage());
        assert!(!Usage::default().has_nonzero_usage());
    }

    #[test]
    fn empty_channel_data_is_not_content() {
        let mut p = Payload::default();
        p.channel_data = Some(serde_json::json!({}));
        assert!(!p.has_channel_data());
        p.channel_data = Some(serde_json::json!({"embed": {"title": "x"}}));
        assert!(p.has_channel_data());
    }

    #[test]
    fn result_parses_with_missing_fields() {
        let r: AgentRunResult =
            serde_json::from_str(r#"{"payloads":[{"text":"hi"}]}"#).unwrap();
        assert_eq!(r.payloads[0].trimmed_text(), Some("hi"));
        assert_eq!(r.meta.agent_meta.usage, Usage::default());
    }
}
