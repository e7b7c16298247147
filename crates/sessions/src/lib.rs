//! Session management for cronturn.
//!
//! Durable session entries keyed by `agent:<agentId>:<trigger>`, a JSON file
//! store, reset lifecycle, per-session run locks and CLI backend session ids.

pub mod cli_session;
pub mod lifecycle;
pub mod lock;
pub mod resolve;
pub mod session_key;
pub mod store;

pub use cli_session::{cli_session_key, CliSessionRegistry, InMemoryCliSessions};
pub use lifecycle::LifecycleManager;
pub use lock::{SessionLockMap, SessionPermit};
pub use resolve::{resolve_session, SessionContext};
pub use session_key::{agent_session_key, cron_trigger_key, main_session_key};
pub use store::{JsonSessionStore, RunStatus, SessionEntry, SessionStore};
