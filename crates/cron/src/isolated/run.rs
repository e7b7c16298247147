//! The isolated turn runner.
//!
//! One call to [`IsolatedTurnRunner::run_turn`] executes a single cron turn:
//!
//! ```text
//! lock session -> resolve session -> register run -> refresh skills
//!   -> select models -> shape prompt -> run with fallback
//!   -> select output -> scan output -> deliver -> persist
//! ```
//!
//! Turns for the same session are serialised by a per-session lock held
//! from resolution through persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ct_domain::agent::{
    timeout_ms_from_secs, AgentConfigProvider, AgentSettings, DEFAULT_CONTEXT_TOKENS,
};
use ct_domain::config::{SecurityConfig, SuspiciousPolicy};
use ct_domain::error::{Error, Result};
use ct_domain::job::CronJob;
use ct_domain::model::ProviderKind;
use ct_domain::payload::{AgentRunResult, Usage};
use ct_domain::snapshot::SkillSnapshot;
use ct_domain::trace::TraceEvent;
use ct_providers::{
    resolve_model_selection, run_with_fallback, AgentRunner, AttemptRecord, ModelOverrides,
    ModelStatusProvider, PromptContext,
};
use ct_sessions::{
    agent_session_key, cli_session_key, cron_trigger_key, resolve_session, CliSessionRegistry,
    LifecycleManager, SessionContext, SessionLockMap, SessionStore,
};
use ct_skills::SkillSnapshotProvider;

use crate::delivery::{resolve_delivery_plan, DeliveryTarget, DeliveryTargetResolver};
use crate::events::{RunContext, RunContextGuard, RunContextRegistry, RunEvent};
use crate::outbound::OutboundSink;
use crate::security::{detect_suspicious_patterns, is_external_hook_session, is_gmail_hook_session};

use super::helpers::{
    is_heartbeat_only_response, pick_last_deliverable_payload,
    pick_last_non_empty_text_from_payloads, pick_summary_from_payloads,
};
use super::persist::{apply_failure, apply_success, persist_session, stored_cli_session_id, TurnRecord};
use super::prompt::build_turn_prompt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Collaborators of the turn runner.
#[derive(Clone)]
pub struct TurnDeps {
    pub agents: Arc<dyn AgentConfigProvider>,
    pub sessions: Arc<dyn SessionStore>,
    pub skills: Arc<dyn SkillSnapshotProvider>,
    pub models: Arc<dyn ModelStatusProvider>,
    /// Serves providers of kind [`ProviderKind::Cli`].
    pub cli_runner: Arc<dyn AgentRunner>,
    /// Serves providers of kind [`ProviderKind::Embedded`].
    pub embedded_runner: Arc<dyn AgentRunner>,
    pub cli_sessions: Arc<dyn CliSessionRegistry>,
    pub targets: Arc<dyn DeliveryTargetResolver>,
    pub outbound: Arc<dyn OutboundSink>,
    pub events: Arc<dyn RunContextRegistry>,
    pub security: SecurityConfig,
    pub lifecycle: LifecycleManager,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TurnOptions {
    /// Never rebuild the skill snapshot.  The cached one is reused, or an
    /// empty one when the session has none.
    pub fast: bool,
}

/// One turn to run.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub job: CronJob,
    /// Replaces `job.payload.message`.
    pub message: Option<String>,
    /// Replaces the job's agent.
    pub agent_id: Option<String>,
    /// Trigger key (or a full `agent:` key).  Defaults to `cron:<jobId>`.
    pub session_key: Option<String>,
}

impl TurnRequest {
    pub fn new(job: CronJob) -> Self {
        Self {
            job,
            message: None,
            agent_id: None,
            session_key: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    NotRequested,
    Delivered {
        channel: String,
        to: String,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
        best_effort: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub model_ref: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AttemptRecord> for AttemptSummary {
    fn from(record: &AttemptRecord) -> Self {
        Self {
            model_ref: record.model_ref.to_string(),
            duration_ms: record.duration_ms,
            error: record.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub run_id: String,
    pub session_key: String,
    pub session_id: String,
    pub is_new_session: bool,
    pub provider: String,
    pub model: String,
    pub attempts: Vec<AttemptSummary>,
    pub output_text: Option<String>,
    pub summary: Option<String>,
    pub usage: Usage,
    pub delivery: DeliveryOutcome,
    /// Set when the session could not be written after a delivery went out.
    pub persist_error: Option<String>,
}

/// Terminal error plus how many model attempts were made before it.
struct TurnFailure {
    error: Error,
    attempts: usize,
}

impl From<Error> for TurnFailure {
    fn from(error: Error) -> Self {
        Self { error, attempts: 0 }
    }
}

/// Skills for this turn, and whether they changed since the session last
/// saw them.
struct SkillsState {
    snapshot: SkillSnapshot,
    refreshed: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct IsolatedTurnRunner {
    deps: TurnDeps,
    options: TurnOptions,
    locks: SessionLockMap,
}

impl IsolatedTurnRunner {
    pub fn new(deps: TurnDeps, options: TurnOptions) -> Self {
        Self {
            deps,
            options,
            locks: SessionLockMap::new(),
        }
    }

    /// Run one isolated turn.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let job = &request.job;

        let agent_id = request
            .agent_id
            .clone()
            .or_else(|| job.agent_id.clone())
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.deps.agents.default_agent_id());
        let settings = self.deps.agents.agent_settings(&agent_id);
        let trigger = request
            .session_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| cron_trigger_key(&job.id));
        let session_key = agent_session_key(&agent_id, &trigger);

        tracing::info!(job_id = %job.id, agent_id = %agent_id, session_key = %session_key, run_id = %run_id, "cron turn started");

        let result = {
            let _permit = self
                .locks
                .acquire(&settings.session_store_path, &session_key)
                .await?;
            self.run_locked(&request, &settings, &session_key, &run_id)
                .await
        };
        self.locks.prune_idle();

        let duration_ms = started.elapsed().as_millis() as u64;
        let (status, attempts) = match &result {
            Ok(outcome) => ("ok", outcome.attempts.len()),
            Err(failure) => ("error", failure.attempts),
        };
        TraceEvent::TurnFinished {
            job_id: job.id.clone(),
            run_id: run_id.clone(),
            status: status.into(),
            attempts,
            duration_ms,
        }
        .emit();

        match result {
            Ok(outcome) => {
                tracing::info!(
                    job_id = %job.id,
                    run_id = %run_id,
                    provider = %outcome.provider,
                    model = %outcome.model,
                    duration_ms,
                    "cron turn completed"
                );
                Ok(outcome)
            }
            Err(failure) => Err(failure.error),
        }
    }

    async fn run_locked(
        &self,
        request: &TurnRequest,
        settings: &AgentSettings,
        session_key: &str,
        run_id: &str,
    ) -> std::result::Result<TurnOutcome, TurnFailure> {
        let now = Utc::now();
        let mut session = resolve_session(
            self.deps.sessions.as_ref(),
            &settings.session_store_path,
            session_key,
            &self.deps.lifecycle,
            now,
        )
        .await?;

        let guard = RunContextGuard::register(
            self.deps.events.clone(),
            RunContext {
                run_id: run_id.to_owned(),
                session_key: session_key.to_owned(),
                session_id: session.entry.session_id.clone(),
                job_id: request.job.id.clone(),
                agent_id: settings.agent_id.clone(),
            },
        );
        guard.track(RunEvent::Accepted);

        let result = self
            .execute(request, settings, &mut session, &guard, run_id, now)
            .await;
        match &result {
            Ok(outcome) => guard.track(RunEvent::Completed {
                provider: outcome.provider.clone(),
                model: outcome.model.clone(),
            }),
            Err(failure) => guard.track(RunEvent::Failed {
                error: failure.error.to_string(),
            }),
        }
        result
    }

    async fn execute(
        &self,
        request: &TurnRequest,
        settings: &AgentSettings,
        session: &mut SessionContext,
        guard: &RunContextGuard,
        run_id: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<TurnOutcome, TurnFailure> {
        let job = &request.job;
        let skills = self.refresh_skills(settings, session).await;

        // ── Model selection ──────────────────────────────────────────
        let overrides = ModelOverrides {
            job_model: job.payload.model.as_deref(),
            job_fallbacks: job.payload.fallbacks.as_deref(),
            gmail_hook: is_gmail_hook_session(&session.session_key),
        };
        let selection = resolve_model_selection(settings, overrides, self.deps.models.as_ref())?;

        // ── Prompt ───────────────────────────────────────────────────
        let message = request
            .message
            .as_deref()
            .unwrap_or(&job.payload.message);
        let prompt = build_turn_prompt(
            job,
            message,
            &session.session_key,
            now,
            settings.user_timezone.as_deref(),
        );
        let include_system = !session.system_sent || skills.refreshed;
        let system_prompt = Some(skills.snapshot.prompt.clone())
            .filter(|p| include_system && !p.trim().is_empty());
        let thinking = job
            .payload
            .thinking
            .clone()
            .or_else(|| settings.thinking_default.clone());
        let timeout_ms = job
            .payload
            .timeout_seconds
            .filter(|s| *s > 0)
            .map(timeout_ms_from_secs)
            .unwrap_or(settings.timeout_ms);

        let base_ctx = PromptContext {
            run_id: run_id.to_owned(),
            session_id: session.entry.session_id.clone(),
            session_key: session.session_key.clone(),
            prompt,
            system_prompt,
            thinking: thinking.clone(),
            workspace_dir: settings.workspace_dir.clone(),
            cli_session_id: None,
        };

        // ── Execution ────────────────────────────────────────────────
        let entry = &session.entry;
        let fallback = run_with_fallback(
            &selection.candidates,
            Duration::from_millis(timeout_ms),
            |candidate| {
                let mut ctx = base_ctx.clone();
                let runner = match candidate.kind {
                    ProviderKind::Cli => {
                        ctx.cli_session_id = stored_cli_session_id(
                            self.deps.cli_sessions.as_ref(),
                            entry,
                            &candidate.model_ref.provider,
                        );
                        self.deps.cli_runner.clone()
                    }
                    ProviderKind::Embedded => self.deps.embedded_runner.clone(),
                };
                let model_ref = candidate.model_ref.clone();
                async move { runner.run(&model_ref, &ctx, timeout_ms).await }
            },
        )
        .await;

        let (attempts, outcome) = match fallback {
            Ok(success) => (success.attempts, Ok((success.value, success.candidate))),
            Err(failure) => (failure.attempts, Err(failure.error)),
        };
        for attempt in &attempts {
            if let Some(error) = &attempt.error {
                guard.track(RunEvent::AttemptFailed {
                    model_ref: attempt.model_ref.to_string(),
                    error: error.clone(),
                });
            }
        }
        let attempt_count = attempts.len();

        let (result, candidate) = match outcome {
            Ok(done) => done,
            Err(error) => {
                tracing::warn!(
                    session_key = %session.session_key,
                    session_id = %session.entry.session_id,
                    attempted = ?selection.candidate_labels(),
                    fallback_chain = selection.has_fallback_chain,
                    skipped = selection.skipped.len(),
                    error = %error,
                    "cron turn failed"
                );
                apply_failure(&mut session.entry, Utc::now(), &error.to_string());
                if let Err(e) = persist_session(self.deps.sessions.as_ref(), session).await {
                    tracing::warn!(session_key = %session.session_key, error = %e, "failed to record turn failure");
                }
                return Err(TurnFailure {
                    error,
                    attempts: attempt_count,
                });
            }
        };

        let provider = result
            .meta
            .agent_meta
            .provider
            .clone()
            .unwrap_or_else(|| candidate.model_ref.provider.clone());
        let model = result
            .meta
            .agent_meta
            .model
            .clone()
            .unwrap_or_else(|| candidate.model_ref.model.clone());
        let usage = result.meta.agent_meta.usage;
        TraceEvent::AgentRun {
            provider: provider.clone(),
            model: model.clone(),
            strategy: candidate.kind.as_str().into(),
            duration_ms: result.meta.duration_ms,
            input_tokens: usage.input,
            output_tokens: usage.output,
        }
        .emit();

        let cli_session_id = match candidate.kind {
            ProviderKind::Cli => result.meta.agent_meta.session_id.clone(),
            ProviderKind::Embedded => None,
        };
        if let Some(id) = &cli_session_id {
            self.deps.cli_sessions.set_session_id(
                &cli_session_key(&session.entry.session_id, &candidate.model_ref.provider),
                id,
            );
        }

        // ── Output ───────────────────────────────────────────────────
        let output_text = pick_last_non_empty_text_from_payloads(&result.payloads).map(str::to_owned);
        let summary = pick_summary_from_payloads(&result.payloads);
        let blocked = self.scan_output(&session.session_key, output_text.as_deref());

        // ── Delivery ─────────────────────────────────────────────────
        let (delivery, delivered_to) = self
            .deliver(job, settings, &result, blocked)
            .await;

        // ── Persist ──────────────────────────────────────────────────
        let context_tokens = settings
            .context_tokens
            .or_else(|| self.deps.agents.lookup_context_tokens(&model))
            .unwrap_or(DEFAULT_CONTEXT_TOKENS);
        apply_success(
            &mut session.entry,
            TurnRecord {
                now: Utc::now(),
                system_sent: include_system,
                snapshot: skills.snapshot,
                usage,
                provider: &provider,
                model: &model,
                context_tokens,
                thinking: thinking.as_deref(),
                cli_session_id: cli_session_id.as_deref(),
                delivered_to: delivered_to.as_ref(),
            },
        );
        let persist_error = match persist_session(self.deps.sessions.as_ref(), session).await {
            Ok(()) => None,
            Err(e) if matches!(delivery, DeliveryOutcome::Delivered { .. }) => {
                tracing::warn!(
                    session_key = %session.session_key,
                    error = %e,
                    "session not persisted after delivery"
                );
                Some(e.to_string())
            }
            Err(e) => {
                return Err(TurnFailure {
                    error: e,
                    attempts: attempt_count,
                })
            }
        };

        Ok(TurnOutcome {
            run_id: run_id.to_owned(),
            session_key: session.session_key.clone(),
            session_id: session.entry.session_id.clone(),
            is_new_session: session.is_new_session,
            provider,
            model,
            attempts: attempts.iter().map(AttemptSummary::from).collect(),
            output_text,
            summary,
            usage,
            delivery,
            persist_error,
        })
    }

    /// Snapshot for this turn.  Snapshot failures never fail the turn; the
    /// cached snapshot (or an empty one) is used instead.
    async fn refresh_skills(&self, settings: &AgentSettings, session: &SessionContext) -> SkillsState {
        let entry = &session.entry;
        let cached = || SkillsState {
            snapshot: entry
                .skills_snapshot
                .clone()
                .unwrap_or_else(|| SkillSnapshot::empty(entry.skills_snapshot_version.unwrap_or(0))),
            refreshed: false,
        };
        if self.options.fast {
            return cached();
        }

        let workspace = &settings.workspace_dir;
        let version = match self.deps.skills.current_version(workspace).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(workspace = %workspace.display(), error = %e, "skills version unavailable, keeping cached snapshot");
                return cached();
            }
        };
        if entry.skills_snapshot.is_some() && entry.skills_snapshot_version == Some(version) {
            return cached();
        }

        match self
            .deps
            .skills
            .build_snapshot(workspace, settings.skills_filter.as_deref())
            .await
        {
            Ok(snapshot) => {
                TraceEvent::SkillsSnapshotRefreshed {
                    session_key: session.session_key.clone(),
                    previous_version: entry.skills_snapshot_version,
                    version: snapshot.version,
                    skills: snapshot.resolved_skills.len(),
                }
                .emit();
                SkillsState {
                    refreshed: !session.is_new_session,
                    snapshot,
                }
            }
            Err(e) => {
                tracing::warn!(workspace = %workspace.display(), error = %e, "skills snapshot failed, keeping cached snapshot");
                cached()
            }
        }
    }

    /// Scan hook-session output.  Returns true when delivery must be
    /// withheld.
    fn scan_output(&self, session_key: &str, output: Option<&str>) -> bool {
        if !self.deps.security.scan_output || !is_external_hook_session(session_key) {
            return false;
        }
        let patterns = detect_suspicious_patterns(output.unwrap_or_default());
        if patterns.is_empty() {
            return false;
        }
        let blocked = self.deps.security.on_suspicious_output == SuspiciousPolicy::Block;
        tracing::warn!(session_key, patterns = ?patterns, blocked, "suspicious patterns in agent output");
        TraceEvent::SuspiciousContent {
            session_key: session_key.to_owned(),
            stage: "output".into(),
            patterns,
            blocked,
        }
        .emit();
        blocked
    }

    async fn deliver(
        &self,
        job: &CronJob,
        settings: &AgentSettings,
        result: &AgentRunResult,
        blocked: bool,
    ) -> (DeliveryOutcome, Option<DeliveryTarget>) {
        let plan = resolve_delivery_plan(job);
        if !plan.requested {
            return (DeliveryOutcome::NotRequested, None);
        }

        let skip = |reason: String| {
            tracing::info!(job_id = %job.id, reason = %reason, "delivery skipped");
            TraceEvent::DeliverySkipped {
                job_id: job.id.clone(),
                reason: reason.clone(),
            }
            .emit();
            (DeliveryOutcome::Skipped { reason }, None)
        };

        if blocked {
            return skip("suspicious output blocked".into());
        }
        if is_heartbeat_only_response(&result.payloads, settings.heartbeat_ack_max_chars) {
            return skip("heartbeat only".into());
        }
        let Some(payload) = pick_last_deliverable_payload(&result.payloads) else {
            return skip("no deliverable payload".into());
        };

        let target = self.deps.targets.resolve(&plan, settings).await;
        if let Some(error) = &target.error {
            return skip(format!("target unresolved: {error}"));
        }

        match self
            .deps
            .outbound
            .deliver(&target, std::slice::from_ref(payload))
            .await
        {
            Ok(()) => {
                let channel = target.channel.map(|c| c.to_string()).unwrap_or_default();
                let to = target.to.clone().unwrap_or_default();
                TraceEvent::DeliveryCompleted {
                    job_id: job.id.clone(),
                    channel: channel.clone(),
                    to: to.clone(),
                }
                .emit();
                (DeliveryOutcome::Delivered { channel, to }, Some(target))
            }
            Err(e) => {
                if plan.best_effort {
                    tracing::info!(job_id = %job.id, error = %e, "best-effort delivery failed");
                } else {
                    tracing::warn!(job_id = %job.id, error = %e, "delivery failed");
                }
                (
                    DeliveryOutcome::Failed {
                        error: e.to_string(),
                        best_effort: plan.best_effort,
                    },
                    None,
                )
            }
        }
    }
}
