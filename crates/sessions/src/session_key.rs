//! Session key computation.
//!
//! Key templates:
//! - `agent:<agentId>:main`                 (the agent's main conversation)
//! - `agent:<agentId>:cron:<jobId>`         (isolated cron turns)
//! - `agent:<agentId>:hook:<source>:<id>`   (externally triggered hook turns)

/// Key of the agent's main session, used to find where it last talked.
pub fn main_session_key(agent_id: &str) -> String {
    format!("agent:{}:main", normalize_agent_id(agent_id))
}

/// Default trigger key for a cron job.
pub fn cron_trigger_key(job_id: &str) -> String {
    format!("cron:{}", job_id.trim())
}

/// Full session key for an agent + trigger.  A trigger key that is already a
/// full `agent:` key is returned unchanged.
pub fn agent_session_key(agent_id: &str, trigger_key: &str) -> String {
    let trigger = trigger_key.trim();
    if parse_agent_session_key(trigger).is_some() {
        return trigger.to_owned();
    }
    format!("agent:{}:{trigger}", normalize_agent_id(agent_id))
}

/// Split `agent:<agentId>:<rest>` into `(agentId, rest)`.
pub fn parse_agent_session_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("agent:")?;
    let (agent, rest) = rest.split_once(':')?;
    if agent.is_empty() || rest.is_empty() {
        return None;
    }
    Some((agent, rest))
}

fn normalize_agent_id(agent_id: &str) -> String {
    let id = agent_id.trim().to_ascii_lowercase();
    if id.is_empty() {
        ct_domain::agent::DEFAULT_AGENT_ID.to_owned()
    } else {
        id
    }
}
