//! Writing the turn's results back to the session entry.

use chrono::{DateTime, Utc};

use ct_domain::error::Result;
use ct_domain::payload::Usage;
use ct_domain::snapshot::SkillSnapshot;
use ct_domain::trace::TraceEvent;
use ct_sessions::{cli_session_key, RunStatus, SessionContext, SessionEntry, SessionStore};

use crate::delivery::DeliveryTarget;

/// What a successful turn contributes to its session.
#[derive(Debug, Clone)]
pub struct TurnRecord<'a> {
    pub now: DateTime<Utc>,
    /// The bootstrap system prompt was part of this turn.
    pub system_sent: bool,
    pub snapshot: SkillSnapshot,
    pub usage: Usage,
    pub provider: &'a str,
    pub model: &'a str,
    pub context_tokens: u64,
    pub thinking: Option<&'a str>,
    pub cli_session_id: Option<&'a str>,
    pub delivered_to: Option<&'a DeliveryTarget>,
}

pub fn apply_success(entry: &mut SessionEntry, record: TurnRecord<'_>) {
    entry.updated_at = record.now;
    if record.system_sent {
        entry.system_sent = true;
    }
    entry.skills_snapshot_version = Some(record.snapshot.version);
    entry.skills_snapshot = Some(record.snapshot);
    entry.record_usage(&record.usage);
    entry.model_provider = Some(record.provider.to_owned());
    entry.model = Some(record.model.to_owned());
    entry.context_tokens = Some(record.context_tokens);
    entry.thinking_level = record.thinking.map(str::to_owned);
    if let Some(id) = record.cli_session_id {
        entry
            .cli_session_ids
            .insert(record.provider.to_owned(), id.to_owned());
    }
    if let Some(target) = record.delivered_to {
        entry.last_channel = target.channel.map(|c| c.as_str().to_owned());
        entry.last_to = target.to.clone();
        entry.last_account_id = target.account_id.clone();
    }
    entry.last_run_status = Some(RunStatus::Ok);
    entry.last_error = None;
}

/// Failure-only record: no usage, no `system_sent` change.
pub fn apply_failure(entry: &mut SessionEntry, now: DateTime<Utc>, error: &str) {
    entry.updated_at = now;
    entry.last_run_status = Some(RunStatus::Error);
    entry.last_error = Some(error.to_owned());
}

/// Backend session id to resume for `provider`: the registry first, then
/// the copy recorded on the entry.
pub fn stored_cli_session_id(
    registry: &dyn ct_sessions::CliSessionRegistry,
    entry: &SessionEntry,
    provider: &str,
) -> Option<String> {
    registry
        .get_session_id(&cli_session_key(&entry.session_id, provider))
        .or_else(|| entry.cli_session_ids.get(provider).cloned())
}

pub async fn persist_session(store: &dyn SessionStore, session: &SessionContext) -> Result<()> {
    store
        .update(&session.store_path, &session.session_key, session.entry.clone())
        .await?;
    tracing::debug!(
        session_key = %session.session_key,
        session_id = %session.entry.session_id,
        "session persisted"
    );
    TraceEvent::SessionPersisted {
        session_key: session.session_key.clone(),
        session_id: session.entry.session_id.clone(),
        system_sent: session.entry.system_sent,
        skills_snapshot_version: session.entry.skills_snapshot_version.unwrap_or(0),
        total_tokens: session.entry.total_tokens,
    }
    .emit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_domain::channel::ChannelKind;
    use ct_sessions::{CliSessionRegistry, InMemoryCliSessions};

    fn record<'a>(usage: Usage, target: Option<&'a DeliveryTarget>) -> TurnRecord<'a> {
        TurnRecord {
            now: Utc::now(),
            system_sent: true,
            snapshot: SkillSnapshot::empty(7),
            usage,
            provider: "claude-cli",
            model: "sonnet",
            context_tokens: 200_000,
            thinking: Some("low"),
            cli_session_id: Some("cli-abc"),
            delivered_to: target,
        }
    }

    #[test]
    fn success_accumulates_usage_and_routing() {
        let mut entry = SessionEntry::new(Utc::now());
        let usage = Usage {
            input: 10,
            output: 5,
            ..Default::default()
        };
        let target = DeliveryTarget {
            channel: Some(ChannelKind::Telegram),
            to: Some("42".into()),
            ..Default::default()
        };
        apply_success(&mut entry, record(usage, Some(&target)));
        apply_success(&mut entry, record(usage, None));

        assert!(entry.system_sent);
        assert_eq!(entry.skills_snapshot_version, Some(7));
        assert_eq!(entry.input_tokens, 20);
        assert_eq!(entry.total_tokens, 30);
        assert_eq!(entry.cli_session_ids["claude-cli"], "cli-abc");
        assert_eq!(entry.last_channel.as_deref(), Some("telegram"));
        assert_eq!(entry.last_run_status, Some(RunStatus::Ok));
    }

    #[test]
    fn failure_keeps_counters_and_flags() {
        let mut entry = SessionEntry::new(Utc::now());
        apply_failure(&mut entry, Utc::now(), "all models failed");
        assert!(!entry.system_sent);
        assert_eq!(entry.total_tokens, 0);
        assert_eq!(entry.skills_snapshot_version, None);
        assert_eq!(entry.last_run_status, Some(RunStatus::Error));
        assert_eq!(entry.last_error.as_deref(), Some("all models failed"));
    }

    #[test]
    fn cli_session_id_prefers_registry() {
        let registry = InMemoryCliSessions::new();
        let mut entry = SessionEntry::new(Utc::now());
        assert_eq!(stored_cli_session_id(&registry, &entry, "claude-cli"), None);

        entry.cli_session_ids.insert("claude-cli".into(), "from-entry".into());
        assert_eq!(
            stored_cli_session_id(&registry, &entry, "claude-cli").as_deref(),
            Some("from-entry")
        );

        registry.set_session_id(&cli_session_key(&entry.session_id, "claude-cli"), "from-registry");
        assert_eq!(
            stored_cli_session_id(&registry, &entry, "claude-cli").as_deref(),
            Some("from-registry")
        );
    }
}
