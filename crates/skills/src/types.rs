use serde::{Deserialize, Serialize};

use ct_domain::snapshot::ResolvedSkill;

/// A skill definition loaded from `skill.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
    /// Where the agent finds the skill.  Defaults to the skill directory.
    #[serde(default)]
    pub location: Option<String>,
    /// Hidden skills stay on disk but are never offered to the agent.
    #[serde(default)]
    pub disabled: bool,
}

impl SkillEntry {
    pub fn render_prompt_entry(&self, location: &str) -> String {
        format!(
            "  <skill>\n    <name>{}</name>\n    <description>{}</description>\n    <location>{}</location>\n  </skill>",
            escape_xml(&self.name),
            escape_xml(&self.description),
            escape_xml(location),
        )
    }

    pub fn resolve(&self, location: String) -> ResolvedSkill {
        ResolvedSkill {
            name: self.name.clone(),
            description: self.description.clone(),
            location,
        }
    }
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_entry_escapes_markup() {
        let entry = SkillEntry {
            name: "search".into(),
            description: "find <things> & more".into(),
            location: None,
            disabled: false,
        };
        let rendered = entry.render_prompt_entry("/ws/skills/search");
        assert!(rendered.contains("<name>search</name>"));
        assert!(rendered.contains("find &lt;things&gt; &amp; more"));
        assert!(rendered.contains("<location>/ws/skills/search</location>"));
    }
}
