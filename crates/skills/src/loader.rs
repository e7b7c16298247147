use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ct_domain::error::{Error, Result};

use crate::types::SkillEntry;

/// Skills live under `<workspace>/skills/<name>/skill.toml`.
pub fn skills_root(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join("skills")
}

/// Load a `skill.toml` from a skill directory.
pub fn load_skill_entry(skill_dir: &Path) -> Result<SkillEntry> {
    let toml_path = skill_dir.join("skill.toml");
    let content = std::fs::read_to_string(&toml_path)?;
    let entry: SkillEntry = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(entry)
}

/// Scan the skills root directory and load all `skill.toml` entries,
/// paired with their directory.  Sorted by name.
pub fn scan_skills(skills_root: &Path) -> Result<Vec<(SkillEntry, PathBuf)>> {
    let mut entries = Vec::new();
    if !skills_root.exists() {
        return Ok(entries);
    }
    let read_dir = std::fs::read_dir(skills_root)?;
    for entry in read_dir {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            match load_skill_entry(&path) {
                Ok(skill) => entries.push((skill, path)),
                Err(e) => {
                    tracing::warn!(
                        skill_dir = %path.display(),
                        error = %e,
                        "skipping skill directory with invalid skill.toml"
                    );
                }
            }
        }
    }
    entries.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    Ok(entries)
}

/// Version of the skills on disk: the newest manifest modification time in
/// milliseconds since the epoch, `0` when there are no skills.  Stable
/// across processes, so a stored version stays comparable between runs.
pub fn manifest_version(skills_root: &Path) -> Result<u64> {
    if !skills_root.exists() {
        return Ok(0);
    }
    let mut newest = 0u64;
    for entry in std::fs::read_dir(skills_root)? {
        let manifest = entry?.path().join("skill.toml");
        let Ok(meta) = std::fs::metadata(&manifest) else {
            continue;
        };
        let modified = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        newest = newest.max(modified);
    }
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("skill.toml"), body).unwrap();
    }

    #[test]
    fn scan_skips_invalid_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let root = skills_root(tmp.path());
        write_skill(&root, "zeta", "name = \"zeta\"\ndescription = \"z\"\n");
        write_skill(&root, "alpha", "name = \"alpha\"\ndescription = \"a\"\n");
        write_skill(&root, "broken", "name = ");

        let skills = scan_skills(&root).unwrap();
        let names: Vec<_> = skills.iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(skills[0].1, root.join("alpha"));
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let root = skills_root(tmp.path());
        assert!(scan_skills(&root).unwrap().is_empty());
        assert_eq!(manifest_version(&root).unwrap(), 0);
    }

    #[test]
    fn version_tracks_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let root = skills_root(tmp.path());
        write_skill(&root, "alpha", "name = \"alpha\"\ndescription = \"a\"\n");
        assert!(manifest_version(&root).unwrap() > 0);
    }
}
