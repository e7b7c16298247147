use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider used for bare model names (`"gpt-4o"` means `"openai/gpt-4o"`).
pub const DEFAULT_PROVIDER: &str = "openai";
/// Model used when nothing is configured anywhere.
pub const DEFAULT_MODEL: &str = "gpt-4o";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model references
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A `provider/model` pair identifying one backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse `"provider/model"`.  A bare model name takes `default_provider`.
    /// Only the first `/` splits, so `"openrouter/meta/llama"` keeps
    /// `"meta/llama"` as the model.  Returns `None` for empty input.
    pub fn parse(raw: &str, default_provider: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('/') {
            Some((provider, model)) => {
                let (provider, model) = (provider.trim(), model.trim());
                if provider.is_empty() || model.is_empty() {
                    return None;
                }
                Some(Self::new(provider.to_ascii_lowercase(), model))
            }
            None => Some(Self::new(default_provider, raw)),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Which execution strategy serves a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// A local agent process driven over stdin/stdout.
    Cli,
    /// An in-process agent talking to a remote API.
    Embedded,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Embedded => "embedded",
        }
    }
}

/// Allow-status of a single model reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelStatus {
    pub allowed: bool,
    pub kind: ProviderKind,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_qualified() {
        let r = ModelRef::parse("Anthropic/claude-sonnet-4", "openai").unwrap();
        assert_eq!(r.provider, "anthropic");
        assert_eq!(r.model, "claude-sonnet-4");
        assert_eq!(r.to_string(), "anthropic/claude-sonnet-4");
    }

    #[test]
    fn parse_bare_uses_default_provider() {
        let r = ModelRef::parse("gpt-4o-mini", "openai").unwrap();
        assert_eq!(r, ModelRef::new("openai", "gpt-4o-mini"));
    }

    #[test]
    fn parse_keeps_nested_model_path() {
        let r = ModelRef::parse("openrouter/meta/llama-3", "openai").unwrap();
        assert_eq!(r.provider, "openrouter");
        assert_eq!(r.model, "meta/llama-3");
    }

    #[test]
    fn parse_rejects_empty_parts() {
        assert!(ModelRef::parse("", "openai").is_none());
        assert!(ModelRef::parse("  ", "openai").is_none());
        assert!(ModelRef::parse("/gpt", "openai").is_none());
        assert!(ModelRef::parse("openai/", "openai").is_none());
    }
}
