use serde::Serialize;

/// Structured trace events emitted across all cronturn crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    SessionPersisted {
        session_key: String,
        session_id: String,
        system_sent: bool,
        skills_snapshot_version: u64,
        total_tokens: u64,
    },
    SkillsSnapshotRefreshed {
        session_key: String,
        previous_version: Option<u64>,
        version: u64,
        skills: usize,
    },
    ModelResolved {
        primary: String,
        candidates: Vec<String>,
        skipped: Vec<String>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    AgentRun {
        provider: String,
        model: String,
        strategy: String,
        duration_ms: u64,
        input_tokens: u64,
        output_tokens: u64,
    },
    SuspiciousContent {
        session_key: String,
        stage: String,
        patterns: Vec<String>,
        blocked: bool,
    },
    DeliveryCompleted {
        job_id: String,
        channel: String,
        to: String,
    },
    DeliverySkipped {
        job_id: String,
        reason: String,
    },
    TurnFinished {
        job_id: String,
        run_id: String,
        status: String,
        attempts: usize,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ct_event");
    }
}
