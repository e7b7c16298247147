//! Run-context registry: which turns are in flight, and what happened to
//! them.
//!
//! The turn runner registers its identity through a [`RunContextGuard`]
//! and reports progress with [`RunEvent`]s.  The guard unregisters on drop,
//! so early returns never leave a stale context behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

/// Identity of one in-flight turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
    pub run_id: String,
    pub session_key: String,
    pub session_id: String,
    pub job_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The turn holds its session lock and is about to run.
    Accepted,
    AttemptFailed { model_ref: String, error: String },
    Completed { provider: String, model: String },
    Failed { error: String },
}

pub trait RunContextRegistry: Send + Sync {
    fn register(&self, ctx: RunContext);
    fn unregister(&self, run_id: &str);
    fn track_event(&self, run_id: &str, event: RunEvent);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keeps a run registered for as long as it lives.
pub struct RunContextGuard {
    registry: Arc<dyn RunContextRegistry>,
    run_id: String,
}

impl RunContextGuard {
    pub fn register(registry: Arc<dyn RunContextRegistry>, ctx: RunContext) -> Self {
        let run_id = ctx.run_id.clone();
        registry.register(ctx);
        Self { registry, run_id }
    }

    pub fn track(&self, event: RunEvent) {
        self.registry.track_event(&self.run_id, event);
    }
}

impl Drop for RunContextGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.run_id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-process registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One broadcast notification.
#[derive(Debug, Clone, Serialize)]
pub struct RunEventRecord {
    pub run_id: String,
    /// `None` when the event arrived for a run that was not registered.
    pub context: Option<RunContext>,
    pub event: RunEvent,
    pub at: DateTime<Utc>,
}

/// Process-wide registry with a broadcast feed for subscribers.
pub struct AgentEventRegistry {
    active: RwLock<HashMap<String, RunContext>>,
    event_tx: broadcast::Sender<RunEventRecord>,
}

impl Default for AgentEventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentEventRegistry {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(128);
        Self {
            active: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEventRecord> {
        self.event_tx.subscribe()
    }

    pub fn active_runs(&self) -> Vec<RunContext> {
        self.active.read().values().cloned().collect()
    }

    pub fn context(&self, run_id: &str) -> Option<RunContext> {
        self.active.read().get(run_id).cloned()
    }
}

impl RunContextRegistry for AgentEventRegistry {
    fn register(&self, ctx: RunContext) {
        tracing::debug!(run_id = %ctx.run_id, session_key = %ctx.session_key, "run registered");
        self.active.write().insert(ctx.run_id.clone(), ctx);
    }

    fn unregister(&self, run_id: &str) {
        self.active.write().remove(run_id);
    }

    fn track_event(&self, run_id: &str, event: RunEvent) {
        let context = self.context(run_id);
        if context.is_none() {
            tracing::debug!(run_id, "event for unregistered run");
        }
        // No subscribers is fine.
        let _ = self.event_tx.send(RunEventRecord {
            run_id: run_id.to_owned(),
            context,
            event,
            at: Utc::now(),
        });
    }
}
