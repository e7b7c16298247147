//! Shaping the user-turn message for a cron run.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use ct_domain::job::CronJob;
use ct_domain::trace::TraceEvent;

use crate::security::{
    build_safe_external_prompt, detect_suspicious_patterns, get_hook_type,
    is_external_hook_session,
};

/// `[cron:<id> <label>] <message>`
pub fn format_cron_message(job: &CronJob, message: &str) -> String {
    format!("[cron:{} {}] {}", job.id, job.label(), message.trim())
}

/// `Current time: ...` in the user's timezone, UTC when unset or unknown.
pub fn current_time_line(now: DateTime<Utc>, user_timezone: Option<&str>) -> String {
    let tz = user_timezone
        .map(str::trim)
        .filter(|tz| !tz.is_empty())
        .and_then(|name| match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                tracing::warn!(timezone = %name, "unknown user timezone, using UTC");
                None
            }
        })
        .unwrap_or(Tz::UTC);
    let local = now.with_timezone(&tz);
    format!(
        "Current time: {} ({})",
        local.format("%A, %B %-d, %Y %H:%M"),
        tz.name()
    )
}

/// The full message handed to the agent.
///
/// Hook sessions are scanned for injection patterns and, unless the job
/// opts out, wrapped as untrusted external content.
pub fn build_turn_prompt(
    job: &CronJob,
    message: &str,
    session_key: &str,
    now: DateTime<Utc>,
    user_timezone: Option<&str>,
) -> String {
    let body = if is_external_hook_session(session_key) {
        let patterns = detect_suspicious_patterns(message);
        if !patterns.is_empty() {
            tracing::warn!(
                session_key,
                job_id = %job.id,
                patterns = ?patterns,
                "suspicious patterns in external hook content"
            );
            TraceEvent::SuspiciousContent {
                session_key: session_key.to_owned(),
                stage: "input".into(),
                patterns,
                blocked: false,
            }
            .emit();
        }
        if job.payload.allow_unsafe_external_content {
            format_cron_message(job, message)
        } else {
            build_safe_external_prompt(
                message,
                get_hook_type(session_key),
                job.label(),
                &job.id,
                now,
            )
        }
    } else {
        format_cron_message(job, message)
    };

    format!("{body}\n{}", current_time_line(now, user_timezone))
}
