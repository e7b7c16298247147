//! Model reference resolution.
//!
//! Precedence for the configured model:
//! 1. job payload override
//! 2. Gmail hook model (Gmail hook sessions only, when allowed)
//! 3. agent model (agent override, then agent defaults)
//! 4. built-in default
//!
//! The candidate chain is the primary followed by the fallback override,
//! in order, with exact duplicates removed.

use ct_domain::agent::AgentSettings;
use ct_domain::error::{Error, Result};
use ct_domain::model::{ModelRef, ProviderKind, DEFAULT_MODEL, DEFAULT_PROVIDER};
use ct_domain::trace::TraceEvent;

use crate::traits::ModelStatusProvider;

/// Per-turn inputs that can override the agent's configured model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelOverrides<'a> {
    pub job_model: Option<&'a str>,
    /// `Some(&[])` disables fallback for this job.
    pub job_fallbacks: Option<&'a [String]>,
    pub gmail_hook: bool,
}

/// A model the dispatcher may try, with the strategy that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub model_ref: ModelRef,
    pub kind: ProviderKind,
}

#[derive(Debug, Clone)]
pub struct ModelSelection {
    /// The configured model, allowed or not.
    pub primary: ModelRef,
    /// Allowed candidates in attempt order.
    pub candidates: Vec<Candidate>,
    /// Disallowed refs from the chain, kept for diagnostics.
    pub skipped: Vec<ModelRef>,
    /// Whether a non-empty fallback override was configured.
    pub has_fallback_chain: bool,
}

impl ModelSelection {
    pub fn candidate_labels(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|c| c.model_ref.to_string())
            .collect()
    }
}

pub fn resolve_model_selection(
    settings: &AgentSettings,
    overrides: ModelOverrides<'_>,
    status: &dyn ModelStatusProvider,
) -> Result<ModelSelection> {
    let default_provider = settings.default_provider.as_str();
    let primary = configured_model(settings, overrides, status)?;

    let fallbacks: &[String] = overrides
        .job_fallbacks
        .or(settings.fallbacks.as_deref())
        .unwrap_or(&[]);
    let has_fallback_chain = !fallbacks.is_empty();

    let mut chain = vec![primary.clone()];
    for raw in fallbacks {
        match ModelRef::parse(raw, default_provider) {
            Some(r) if !chain.contains(&r) => chain.push(r),
            Some(_) => {}
            None => tracing::warn!(entry = %raw, "ignoring invalid fallback model"),
        }
    }

    let mut candidates = Vec::new();
    let mut skipped = Vec::new();
    for model_ref in chain {
        let st = status.status(&model_ref);
        if st.allowed {
            candidates.push(Candidate {
                model_ref,
                kind: st.kind,
            });
        } else {
            tracing::warn!(model = %model_ref, "model not allowed, skipping");
            skipped.push(model_ref);
        }
    }

    if candidates.is_empty() {
        return Err(Error::ModelNotAllowed {
            model_ref: primary.to_string(),
        });
    }

    TraceEvent::ModelResolved {
        primary: primary.to_string(),
        candidates: candidates.iter().map(|c| c.model_ref.to_string()).collect(),
        skipped: skipped.iter().map(ToString::to_string).collect(),
    }
    .emit();

    Ok(ModelSelection {
        primary,
        candidates,
        skipped,
        has_fallback_chain,
    })
}

fn configured_model(
    settings: &AgentSettings,
    overrides: ModelOverrides<'_>,
    status: &dyn ModelStatusProvider,
) -> Result<ModelRef> {
    let default_provider = settings.default_provider.as_str();

    if let Some(raw) = overrides.job_model {
        return ModelRef::parse(raw, default_provider)
            .ok_or_else(|| Error::Config(format!("invalid model override {raw:?}")));
    }

    if overrides.gmail_hook {
        if let Some(raw) = settings.hooks_gmail_model.as_deref() {
            match ModelRef::parse(raw, default_provider) {
                Some(r) if status.status(&r).allowed => return Ok(r),
                Some(r) => {
                    tracing::warn!(model = %r, "gmail hook model not allowed, using agent model");
                }
                None => tracing::warn!(entry = %raw, "ignoring invalid gmail hook model"),
            }
        }
    }

    if let Some(raw) = settings.model.as_deref() {
        match ModelRef::parse(raw, default_provider) {
            Some(r) => return Ok(r),
            None => tracing::warn!(entry = %raw, "ignoring invalid agent model"),
        }
    }

    Ok(ModelRef::new(DEFAULT_PROVIDER, DEFAULT_MODEL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_domain::model::ModelStatus;
    use std::path::PathBuf;

    struct Denied(Vec<&'static str>);

    impl ModelStatusProvider for Denied {
        fn status(&self, model: &ModelRef) -> ModelStatus {
            ModelStatus {
                allowed: !self.0.iter().any(|d| *d == model.to_string()),
                kind: if model.provider == "cli" {
                    ProviderKind::Cli
                } else {
                    ProviderKind::Embedded
                },
            }
        }
    }

    fn settings(model: Option<&str>, fallbacks: Option<Vec<&str>>) -> AgentSettings {
        AgentSettings {
            agent_id: "main".into(),
            model: model.map(String::from),
            fallbacks: fallbacks.map(|f| f.into_iter().map(String::from).collect()),
            default_provider: "openai".into(),
            skills_filter: None,
            workspace_dir: PathBuf::from("."),
            timeout_ms: 60_000,
            heartbeat_ack_max_chars: 300,
            thinking_default: None,
            user_timezone: None,
            context_tokens: None,
            session_store_path: PathBuf::from("sessions.json"),
            hooks_gmail_model: Some("openai/gpt-4o-mini".into()),
        }
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let sel = resolve_model_selection(&settings(None, None), Default::default(), &Denied(vec![]))
            .unwrap();
        assert_eq!(sel.primary, ModelRef::new("openai", "gpt-4o"));
        assert_eq!(sel.candidates.len(), 1);
        assert!(!sel.has_fallback_chain);
    }

    #[test]
    fn job_override_wins() {
        let overrides = ModelOverrides {
            job_model: Some("anthropic/claude-sonnet-4"),
            ..Default::default()
        };
        let sel = resolve_model_selection(
            &settings(Some("openai/gpt-4o"), None),
            overrides,
            &Denied(vec![]),
        )
        .unwrap();
        assert_eq!(sel.primary.to_string(), "anthropic/claude-sonnet-4");
    }

    #[test]
    fn gmail_hook_model_only_for_gmail_and_when_allowed() {
        let s = settings(Some("openai/gpt-4o"), None);
        let gmail = ModelOverrides {
            gmail_hook: true,
            ..Default::default()
        };
        let sel = resolve_model_selection(&s, gmail, &Denied(vec![])).unwrap();
        assert_eq!(sel.primary.to_string(), "openai/gpt-4o-mini");

        let sel = resolve_model_selection(&s, gmail, &Denied(vec!["openai/gpt-4o-mini"])).unwrap();
        assert_eq!(sel.primary.to_string(), "openai/gpt-4o");

        let sel = resolve_model_selection(&s, Default::default(), &Denied(vec![])).unwrap();
        assert_eq!(sel.primary.to_string(), "openai/gpt-4o");
    }

    #[test]
    fn chain_preserves_order_and_dedupes() {
        let s = settings(
            Some("openai/gpt-4o"),
            Some(vec!["cli/sonnet", "openai/gpt-4o", "gpt-4o-mini", "cli/sonnet"]),
        );
        let sel = resolve_model_selection(&s, Default::default(), &Denied(vec![])).unwrap();
        assert_eq!(
            sel.candidate_labels(),
            vec!["openai/gpt-4o", "cli/sonnet", "openai/gpt-4o-mini"]
        );
        assert_eq!(sel.candidates[1].kind, ProviderKind::Cli);
        assert!(sel.has_fallback_chain);
    }

    #[test]
    fn empty_job_fallbacks_disable_chain() {
        let s = settings(Some("openai/gpt-4o"), Some(vec!["cli/sonnet"]));
        let none: Vec<String> = vec![];
        let overrides = ModelOverrides {
            job_fallbacks: Some(&none),
            ..Default::default()
        };
        let sel = resolve_model_selection(&s, overrides, &Denied(vec![])).unwrap();
        assert_eq!(sel.candidates.len(), 1);
        assert!(!sel.has_fallback_chain);
    }

    #[test]
    fn disallowed_primary_without_chain_fails() {
        let s = settings(Some("openai/o3"), None);
        let err = resolve_model_selection(&s, Default::default(), &Denied(vec!["openai/o3"]))
            .unwrap_err();
        assert!(matches!(err, Error::ModelNotAllowed { ref model_ref } if model_ref == "openai/o3"));
    }

    #[test]
    fn disallowed_primary_with_chain_is_skipped() {
        let s = settings(Some("openai/o3"), Some(vec!["cli/sonnet"]));
        let sel = resolve_model_selection(&s, Default::default(), &Denied(vec!["openai/o3"]))
            .unwrap();
        assert_eq!(sel.candidate_labels(), vec!["cli/sonnet"]);
        assert_eq!(sel.skipped, vec![ModelRef::new("openai", "o3")]);
    }

    #[test]
    fn invalid_job_override_is_config_error() {
        let overrides = ModelOverrides {
            job_model: Some("openai/"),
            ..Default::default()
        };
        let err = resolve_model_selection(&settings(None, None), overrides, &Denied(vec![]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
