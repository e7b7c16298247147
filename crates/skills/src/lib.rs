//! Workspace skills: `skill.toml` manifests rendered into versioned
//! snapshots for agent prompts.

pub mod loader;
pub mod snapshot;
pub mod types;

pub use snapshot::{SkillSnapshotProvider, WorkspaceSkills};
pub use types::SkillEntry;
