//! Backend session ids for CLI agent processes.
//!
//! A CLI agent keeps its own conversation state; resuming it needs the id it
//! reported on the previous turn.  Keys are `<session_id>:<provider>`.

use std::collections::HashMap;

use parking_lot::RwLock;

pub fn cli_session_key(session_id: &str, provider: &str) -> String {
    format!("{session_id}:{provider}")
}

pub trait CliSessionRegistry: Send + Sync {
    fn get_session_id(&self, key: &str) -> Option<String>;
    fn set_session_id(&self, key: &str, cli_session_id: &str);
}

/// Process-local registry.  Survives across turns of a long-running
/// process; the session entry carries the durable copy.
#[derive(Default)]
pub struct InMemoryCliSessions {
    ids: RwLock<HashMap<String, String>>,
}

impl InMemoryCliSessions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CliSessionRegistry for InMemoryCliSessions {
    fn get_session_id(&self, key: &str) -> Option<String> {
        self.ids.read().get(key).cloned()
    }

    fn set_session_id(&self, key: &str, cli_session_id: &str) {
        self.ids
            .write()
            .insert(key.to_owned(), cli_session_id.to_owned());
    }
}
