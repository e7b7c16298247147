//! Versioned skill snapshots for agent sessions.
//!
//! A session records the snapshot version it was last given.  When the
//! workspace version moves, the turn runner asks for a fresh snapshot and
//! stores it on the session.

use std::path::Path;

use ct_domain::error::Result;
use ct_domain::snapshot::SkillSnapshot;

use crate::loader;

/// Produces skill snapshots for an agent workspace.
#[async_trait::async_trait]
pub trait SkillSnapshotProvider: Send + Sync {
    /// Build a snapshot of the skills visible to the agent.  `filter`
    /// restricts the snapshot to the named skills.
    async fn build_snapshot(
        &self,
        workspace_dir: &Path,
        filter: Option<&[String]>,
    ) -> Result<SkillSnapshot>;

    /// Current version of the workspace's skills.
    async fn current_version(&self, workspace_dir: &Path) -> Result<u64>;
}

/// Filesystem-backed provider scanning `<workspace>/skills`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkspaceSkills;

#[async_trait::async_trait]
impl SkillSnapshotProvider for WorkspaceSkills {
    async fn build_snapshot(
        &self,
        workspace_dir: &Path,
        filter: Option<&[String]>,
    ) -> Result<SkillSnapshot> {
        let root = loader::skills_root(workspace_dir);
        let version = loader::manifest_version(&root)?;
        let entries = loader::scan_skills(&root)?;

        let mut prompt_entries = Vec::new();
        let mut resolved = Vec::new();
        for (entry, dir) in entries {
            if entry.disabled {
                continue;
            }
            if let Some(filter) = filter {
                if !filter.iter().any(|f| f.eq_ignore_ascii_case(&entry.name)) {
                    continue;
                }
            }
            let location = entry
                .location
                .clone()
                .unwrap_or_else(|| dir.display().to_string());
            prompt_entries.push(entry.render_prompt_entry(&location));
            resolved.push(entry.resolve(location));
        }

        let prompt = if prompt_entries.is_empty() {
            String::new()
        } else {
            format!(
                "<available_skills>\n{}\n</available_skills>",
                prompt_entries.join("\n")
            )
        };

        tracing::debug!(
            workspace = %workspace_dir.display(),
            skills = resolved.len(),
            version,
            "skills snapshot built"
        );

        Ok(SkillSnapshot {
            prompt,
            resolved_skills: resolved,
            version,
        })
    }

    async fn current_version(&self, workspace_dir: &Path) -> Result<u64> {
        loader::manifest_version(&loader::skills_root(workspace_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(workspace: &Path, name: &str, extra: &str) {
        let dir = workspace.join("skills").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("skill.toml"),
            format!("name = \"{name}\"\ndescription = \"{name} skill\"\n{extra}"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn snapshot_renders_filtered_skills() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "calendar", "");
        write_skill(tmp.path(), "email", "location = \"builtin:email\"\n");
        write_skill(tmp.path(), "secret", "disabled = true\n");

        let all = WorkspaceSkills.build_snapshot(tmp.path(), None).await.unwrap();
        assert_eq!(all.resolved_skills.len(), 2);
        assert!(all.prompt.starts_with("<available_skills>"));
        assert!(all.prompt.contains("<location>builtin:email</location>"));
        assert!(!all.prompt.contains("secret"));
        assert_eq!(
            all.version,
            WorkspaceSkills.current_version(tmp.path()).await.unwrap()
        );

        let filter = vec!["EMAIL".to_string()];
        let some = WorkspaceSkills
            .build_snapshot(tmp.path(), Some(&filter))
            .await
            .unwrap();
        assert_eq!(some.resolved_skills.len(), 1);
        assert_eq!(some.resolved_skills[0].name, "email");
    }

    #[tokio::test]
    async fn empty_workspace_has_empty_prompt() {
        let tmp = tempfile::tempdir().unwrap();
        let snap = WorkspaceSkills.build_snapshot(tmp.path(), None).await.unwrap();
        assert!(snap.prompt.is_empty());
        assert_eq!(snap.version, 0);
    }
}
