//! Config-driven model allow-list and strategy lookup.

use std::collections::HashSet;

use ct_domain::config::{BackendKind, ModelsConfig};
use ct_domain::model::{ModelRef, ModelStatus, ProviderKind};

use crate::traits::ModelStatusProvider;

/// One allow-list rule.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowRule {
    Provider(String),
    Exact(ModelRef),
}

/// Model status derived from `[models]`.
///
/// An empty allow-list allows everything.  Providers configured with
/// `kind = "cli"` run through the process strategy; everything else is
/// embedded.
#[derive(Debug, Clone, Default)]
pub struct CatalogModelStatus {
    rules: Vec<AllowRule>,
    cli_providers: HashSet<String>,
}

impl CatalogModelStatus {
    pub fn from_config(models: &ModelsConfig) -> Self {
        let rules = models
            .allowlist
            .iter()
            .filter_map(|raw| {
                let raw = raw.trim();
                if let Some(provider) = raw.strip_suffix("/*") {
                    return Some(AllowRule::Provider(provider.to_ascii_lowercase()));
                }
                match ModelRef::parse(raw, &models.default_provider) {
                    Some(r) => Some(AllowRule::Exact(r)),
                    None => {
                        tracing::warn!(entry = %raw, "ignoring invalid allowlist entry");
                        None
                    }
                }
            })
            .collect();

        let cli_providers = models
            .providers
            .iter()
            .filter(|p| p.kind == BackendKind::Cli)
            .map(|p| p.id.to_ascii_lowercase())
            .collect();

        Self {
            rules,
            cli_providers,
        }
    }

    fn is_allowed(&self, model: &ModelRef) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let provider = model.provider.to_ascii_lowercase();
        self.rules.iter().any(|rule| match rule {
            AllowRule::Provider(p) => *p == provider,
            AllowRule::Exact(r) => r.provider == provider && r.model == model.model,
        })
    }
}

impl ModelStatusProvider for CatalogModelStatus {
    fn status(&self, model: &ModelRef) -> ModelStatus {
        let kind = if self.cli_providers.contains(&model.provider.to_ascii_lowercase()) {
            ProviderKind::Cli
        } else {
            ProviderKind::Embedded
        };
        ModelStatus {
            allowed: self.is_allowed(model),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_domain::config::ProviderConfig;

    fn models(allowlist: &[&str]) -> ModelsConfig {
        ModelsConfig {
            allowlist: allowlist.iter().map(|s| s.to_string()).collect(),
            providers: vec![ProviderConfig {
                id: "claude-cli".into(),
                kind: BackendKind::Cli,
                base_url: None,
                api_key_env: None,
                command: Some("claude".into()),
                args: vec![],
                session_arg: None,
                model_arg: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let cat = CatalogModelStatus::from_config(&models(&[]));
        assert!(cat.status(&ModelRef::new("anything", "goes")).allowed);
    }

    #[test]
    fn allowlist_rules() {
        let cat = CatalogModelStatus::from_config(&models(&[
            "anthropic/*",
            "openai/gpt-4o",
            "gpt-4o-mini",
        ]));
        assert!(cat.status(&ModelRef::new("anthropic", "claude-opus-4")).allowed);
        assert!(cat.status(&ModelRef::new("openai", "gpt-4o")).allowed);
        assert!(cat.status(&ModelRef::new("openai", "gpt-4o-mini")).allowed);
        assert!(!cat.status(&ModelRef::new("openai", "o3")).allowed);
        assert!(!cat.status(&ModelRef::new("google", "gemini")).allowed);
    }

    #[test]
    fn cli_providers_use_process_strategy() {
        let cat = CatalogModelStatus::from_config(&models(&[]));
        assert_eq!(
            cat.status(&ModelRef::new("claude-cli", "sonnet")).kind,
            ProviderKind::Cli
        );
        assert_eq!(
            cat.status(&ModelRef::new("openai", "gpt-4o")).kind,
            ProviderKind::Embedded
        );
    }
}
