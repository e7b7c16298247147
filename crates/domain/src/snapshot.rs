use serde::{Deserialize, Serialize};

/// Versioned view of the skills an agent can use, rendered once into the
/// system prompt.  Snapshots compare by `version` only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillSnapshot {
    pub prompt: String,
    #[serde(default)]
    pub resolved_skills: Vec<ResolvedSkill>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedSkill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
}

impl SkillSnapshot {
    pub fn empty(version: u64) -> Self {
        Self {
            prompt: String::new(),
            resolved_skills: Vec::new(),
            version,
        }
    }
}
