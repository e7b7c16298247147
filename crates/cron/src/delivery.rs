//! Delivery planning: whether a job's output should be sent, and where.

use std::sync::Arc;

use serde::Serialize;

use ct_domain::agent::AgentSettings;
use ct_domain::channel::{ChannelKind, ChannelSelector};
use ct_domain::config::ChannelsConfig;
use ct_domain::job::{CronJob, DeliveryMode};
use ct_sessions::{main_session_key, SessionStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which part of the job asked for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySource {
    /// The job's `[delivery]` block.
    Explicit,
    /// The older `payload.deliver` / `payload.to` fields.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub requested: bool,
    pub channel: ChannelSelector,
    pub to: Option<String>,
    pub account_id: Option<String>,
    pub best_effort: bool,
    pub source: DeliverySource,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Decide from the job alone whether delivery is requested.
///
/// An explicit `delivery` block wins.  Without one the legacy `deliver`
/// flag decides; when that is unset, naming a recipient counts as a request.
pub fn resolve_delivery_plan(job: &CronJob) -> DeliveryPlan {
    let payload = &job.payload;
    match &job.delivery {
        Some(delivery) => DeliveryPlan {
            requested: delivery.mode == DeliveryMode::Announce,
            channel: delivery.channel.or(payload.channel).unwrap_or_default(),
            to: non_empty(delivery.to.as_ref()).or_else(|| non_empty(payload.to.as_ref())),
            account_id: non_empty(delivery.account_id.as_ref()),
            best_effort: delivery.best_effort,
            source: DeliverySource::Explicit,
        },
        None => {
            let to = non_empty(payload.to.as_ref());
            DeliveryPlan {
                requested: payload.deliver.unwrap_or(to.is_some()),
                channel: payload.channel.unwrap_or_default(),
                to,
                account_id: None,
                best_effort: payload.best_effort_deliver.unwrap_or(false),
                source: DeliverySource::Legacy,
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Target resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A concrete destination.  When `error` is set the target is unusable and
/// delivery is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub channel: Option<ChannelKind>,
    pub to: Option<String>,
    pub account_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryTarget {
    pub fn unresolved(channel: Option<ChannelKind>, error: impl Into<String>) -> Self {
        Self {
            channel,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
pub trait DeliveryTargetResolver: Send + Sync {
    /// Resolve the plan for the running agent.  Never fails; problems are
    /// reported through [`DeliveryTarget::error`].
    async fn resolve(&self, plan: &DeliveryPlan, agent: &AgentSettings) -> DeliveryTarget;
}

/// Resolves targets from `[channels]` and, for `"last"`, from the agent's
/// main session.
pub struct ConfiguredTargetResolver {
    channels: ChannelsConfig,
    sessions: Arc<dyn SessionStore>,
}

impl ConfiguredTargetResolver {
    pub fn new(channels: ChannelsConfig, sessions: Arc<dyn SessionStore>) -> Self {
        Self { channels, sessions }
    }

    async fn last_route(
        &self,
        agent: &AgentSettings,
    ) -> Result<(ChannelKind, Option<String>, Option<String>), String> {
        let key = main_session_key(&agent.agent_id);
        let sessions = self
            .sessions
            .load(&agent.session_store_path)
            .await
            .map_err(|e| format!("reading main session: {e}"))?;
        let entry = sessions
            .get(&key)
            .ok_or_else(|| format!("no main session ({key}) to take the last channel from"))?;
        let channel = entry
            .last_channel
            .as_deref()
            .ok_or_else(|| format!("main session {key} has no last channel"))?
            .parse::<ChannelKind>()?;
        Ok((channel, entry.last_to.clone(), entry.last_account_id.clone()))
    }
}

#[async_trait::async_trait]
impl DeliveryTargetResolver for ConfiguredTargetResolver {
    async fn resolve(&self, plan: &DeliveryPlan, agent: &AgentSettings) -> DeliveryTarget {
        let (channel, route_to, route_account) = match plan.channel {
            ChannelSelector::Channel(kind) => (kind, None, None),
            ChannelSelector::Last => match self.last_route(agent).await {
                Ok(route) => route,
                Err(e) => return DeliveryTarget::unresolved(None, e),
            },
        };

        let Some(config) = self.channels.get(channel) else {
            return DeliveryTarget::unresolved(
                Some(channel),
                format!("channel {channel} is not configured"),
            );
        };

        let to = plan
            .to
            .clone()
            .or(route_to)
            .or_else(|| non_empty(config.default_to.as_ref()));
        let Some(to) = to else {
            return DeliveryTarget::unresolved(
                Some(channel),
                format!("no recipient for channel {channel}"),
            );
        };

        DeliveryTarget {
            channel: Some(channel),
            to: Some(to),
            account_id: plan
                .account_id
                .clone()
                .or(route_account)
                .or_else(|| config.default_account.clone()),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_domain::config::{ChannelConfig, Config};
    use ct_domain::agent::AgentConfigProvider;
    use ct_domain::job::{JobDelivery, JobPayload};
    use ct_sessions::{JsonSessionStore, SessionEntry};

    fn job(payload: JobPayload, delivery: Option<JobDelivery>) -> CronJob {
        CronJob {
            id: "j1".into(),
            name: "digest".into(),
            agent_id: None,
            payload,
            delivery,
        }
    }

    fn payload() -> JobPayload {
        JobPayload {
            message: "summarize".into(),
            ..Default::default()
        }
    }

    #[test]
    fn legacy_flags() {
        let plan = resolve_delivery_plan(&job(payload(), None));
        assert!(!plan.requested);
        assert_eq!(plan.source, DeliverySource::Legacy);

        let mut p = payload();
        p.to = Some(" #ops ".into());
        let plan = resolve_delivery_plan(&job(p.clone(), None));
        assert!(plan.requested);
        assert_eq!(plan.to.as_deref(), Some("#ops"));

        p.deliver = Some(false);
        assert!(!resolve_delivery_plan(&job(p, None)).requested);

        let mut p = payload();
        p.deliver = Some(true);
        p.channel = Some(ChannelSelector::Channel(ChannelKind::Slack));
        p.best_effort_deliver = Some(true);
        let plan = resolve_delivery_plan(&job(p, None));
        assert!(plan.requested);
        assert!(plan.best_effort);
        assert_eq!(plan.channel, ChannelSelector::Channel(ChannelKind::Slack));
    }

    #[test]
    fn explicit_block_wins() {
        let mut p = payload();
        p.deliver = Some(true);
        let plan = resolve_delivery_plan(&job(
            p.clone(),
            Some(JobDelivery {
                mode: DeliveryMode::None,
                ..Default::default()
            }),
        ));
        assert!(!plan.requested);
        assert_eq!(plan.source, DeliverySource::Explicit);

        let plan = resolve_delivery_plan(&job(
            p,
            Some(JobDelivery {
                mode: DeliveryMode::Announce,
                channel: Some(ChannelSelector::Channel(ChannelKind::Telegram)),
                to: Some("12345".into()),
                account_id: Some("bot-a".into()),
                best_effort: true,
            }),
        ));
        assert!(plan.requested);
        assert_eq!(plan.channel, ChannelSelector::Channel(ChannelKind::Telegram));
        assert_eq!(plan.account_id.as_deref(), Some("bot-a"));
    }

    fn channels() -> ChannelsConfig {
        ChannelsConfig {
            slack: Some(ChannelConfig {
                webhook_url: "http://127.0.0.1:9/slack".into(),
                token_env: None,
                default_to: Some("#general".into()),
                default_account: Some("workspace-1".into()),
            }),
            ..Default::default()
        }
    }

    fn plan(channel: ChannelSelector, to: Option<&str>) -> DeliveryPlan {
        DeliveryPlan {
            requested: true,
            channel,
            to: to.map(str::to_owned),
            account_id: None,
            best_effort: false,
            source: DeliverySource::Explicit,
        }
    }

    #[tokio::test]
    async fn explicit_channel_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.session.store_path = tmp.path().join("{agent_id}.json").display().to_string();
        let settings = cfg.agent_settings("main");
        let resolver = ConfiguredTargetResolver::new(channels(), Arc::new(JsonSessionStore::new()));

        let target = resolver
            .resolve(&plan(ChannelSelector::Channel(ChannelKind::Slack), None), &settings)
            .await;
        assert_eq!(target.error, None);
        assert_eq!(target.to.as_deref(), Some("#general"));
        assert_eq!(target.account_id.as_deref(), Some("workspace-1"));

        let target = resolver
            .resolve(&plan(ChannelSelector::Channel(ChannelKind::Discord), Some("x")), &settings)
            .await;
        assert!(target.error.unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn last_channel_reads_main_session() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.session.store_path = tmp.path().join("{agent_id}.json").display().to_string();
        let settings = cfg.agent_settings("main");
        let store = Arc::new(JsonSessionStore::new());
        let resolver = ConfiguredTargetResolver::new(channels(), store.clone());

        let target = resolver.resolve(&plan(ChannelSelector::Last, None), &settings).await;
        assert!(target.error.is_some());
        assert_eq!(target.channel, None);

        let mut main = SessionEntry::new(chrono::Utc::now());
        main.last_channel = Some("slack".into());
        main.last_to = Some("U123".into());
        store
            .update(&settings.session_store_path, "agent:main:main", main)
            .await
            .unwrap();

        let target = resolver.resolve(&plan(ChannelSelector::Last, None), &settings).await;
        assert_eq!(target.error, None);
        assert_eq!(target.channel, Some(ChannelKind::Slack));
        assert_eq!(target.to.as_deref(), Some("U123"));
    }
}
