//! Wiring the default collaborators from configuration.
//!
//! The `run` command (and anything embedding the runner) calls
//! [`build_turn_deps`] to get a fully wired [`TurnDeps`].

use std::sync::Arc;

use anyhow::Context;

use ct_domain::config::{Config, ConfigSeverity};
use ct_providers::{CatalogModelStatus, OpenAiCompatRunner, ProcessAgentRunner};
use ct_sessions::{InMemoryCliSessions, JsonSessionStore, LifecycleManager, SessionStore};
use ct_skills::WorkspaceSkills;

use crate::delivery::ConfiguredTargetResolver;
use crate::events::AgentEventRegistry;
use crate::isolated::TurnDeps;
use crate::outbound::WebhookSink;

/// Log config issues and fail on errors.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// Validate config and build the default collaborators.
pub fn build_turn_deps(config: Arc<Config>) -> anyhow::Result<TurnDeps> {
    check_config(&config)?;

    // ── Sessions ─────────────────────────────────────────────────────
    let sessions: Arc<dyn SessionStore> = Arc::new(JsonSessionStore::new());
    let lifecycle = LifecycleManager::new(config.session.reset.clone());
    tracing::info!(
        store_path = %config.session.store_path,
        daily_reset_hour = ?config.session.reset.daily_reset_hour,
        idle_minutes = ?config.session.reset.idle_minutes,
        "session store ready"
    );

    // ── Models ───────────────────────────────────────────────────────
    let models = Arc::new(CatalogModelStatus::from_config(&config.models));
    let cli_runner = Arc::new(ProcessAgentRunner::from_config(&config.models));
    let embedded_runner = Arc::new(
        OpenAiCompatRunner::from_config(&config.models)
            .context("initializing embedded agent runner")?,
    );
    if config.models.providers.is_empty() {
        tracing::info!("no providers configured; every turn will fail until one is added");
    } else {
        tracing::info!(
            providers = config.models.providers.len(),
            embedded = embedded_runner.provider_count(),
            "agent runners ready"
        );
    }

    // ── Delivery ─────────────────────────────────────────────────────
    let targets = Arc::new(ConfiguredTargetResolver::new(
        config.channels.clone(),
        sessions.clone(),
    ));
    let outbound = Arc::new(
        WebhookSink::new(config.channels.clone()).context("initializing webhook sink")?,
    );
    tracing::info!(
        channels = config.channels.configured().count(),
        "delivery channels ready"
    );

    Ok(TurnDeps {
        agents: config.clone(),
        sessions,
        skills: Arc::new(WorkspaceSkills),
        models,
        cli_runner,
        embedded_runner,
        cli_sessions: Arc::new(InMemoryCliSessions::new()),
        targets,
        outbound,
        events: Arc::new(AgentEventRegistry::new()),
        security: config.security.clone(),
        lifecycle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_domain::agent::AgentConfigProvider;

    #[test]
    fn default_config_boots() {
        let deps = build_turn_deps(Arc::new(Config::default())).unwrap();
        assert_eq!(deps.agents.default_agent_id(), "main");
        assert!(deps.security.scan_output);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.agents.defaults.timeout_seconds = 0;
        assert!(build_turn_deps(Arc::new(config)).is_err());
    }
}
