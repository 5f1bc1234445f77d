use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::chart::ChartConfiguration;
use crate::chat::Message;

pub const MAX_PROJECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectError {
    #[error("You can only save up to {max} projects. Please delete some projects first.")]
    LimitReached { max: usize },

    #[error("project not found: {id}")]
    NotFound { id: String },

    #[error("project name cannot be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub chart_config: Option<ChartConfiguration>,
    pub last_modified: i64,
}

/// Saved projects, newest first, persisted as one JSON array.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
    projects: Vec<Project>,
    load_warning: Option<String>,
}

impl ProjectStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (projects, load_warning) = match read_projects(&path) {
            Ok((projects, 0)) => (projects, None),
            Ok((projects, skipped)) => {
                let warning = format!(
                    "skipped {skipped} unreadable project(s) in {}",
                    path.display()
                );
                (projects, Some(warning))
            }
            Err(err) => (Vec::new(), Some(format!("{err:#}"))),
        };
        Self {
            path,
            projects,
            load_warning,
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::open(data_dir.join("projects.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set when the file could not be parsed (the store then starts empty)
    /// or when individual entries were dropped.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == id)
    }

    /// Replaces the project with `existing_id` when present, otherwise
    /// prepends a new one subject to `MAX_PROJECTS`.
    pub fn save(
        &mut self,
        name: &str,
        existing_id: Option<&str>,
        messages: Vec<Message>,
        chart_config: Option<ChartConfiguration>,
    ) -> anyhow::Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProjectError::EmptyName.into());
        }

        let existing = existing_id.and_then(|id| {
            self.projects
                .iter()
                .position(|project| project.id == id)
        });
        let project = Project {
            id: match existing {
                Some(idx) => self.projects[idx].id.clone(),
                None => Uuid::new_v4().to_string(),
            },
            name: name.to_string(),
            messages,
            chart_config,
            last_modified: now_millis(),
        };

        let mut next = self.projects.clone();
        match existing {
            Some(idx) => next[idx] = project.clone(),
            None => {
                if next.len() >= MAX_PROJECTS {
                    return Err(ProjectError::LimitReached { max: MAX_PROJECTS }.into());
                }
                next.insert(0, project.clone());
            }
        }
        self.commit(next)?;
        Ok(project)
    }

    /// Auto-save path. Returns `false` when the project no longer exists.
    pub fn update(
        &mut self,
        id: &str,
        messages: &[Message],
        chart_config: Option<&ChartConfiguration>,
    ) -> anyhow::Result<bool> {
        let mut next = self.projects.clone();
        let Some(project) = next.iter_mut().find(|project| project.id == id) else {
            return Ok(false);
        };
        project.messages = messages.to_vec();
        project.chart_config = chart_config.cloned();
        project.last_modified = now_millis();
        self.commit(next)?;
        Ok(true)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> anyhow::Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProjectError::EmptyName.into());
        }
        let mut next = self.projects.clone();
        let Some(project) = next.iter_mut().find(|project| project.id == id) else {
            return Err(ProjectError::NotFound { id: id.to_string() }.into());
        };
        project.name = name.to_string();
        project.last_modified = now_millis();
        self.commit(next)
    }

    /// Returns whether anything was removed.
    pub fn delete(&mut self, id: &str) -> anyhow::Result<bool> {
        if !self.projects.iter().any(|project| project.id == id) {
            return Ok(false);
        }
        let next: Vec<Project> = self
            .projects
            .iter()
            .filter(|project| project.id != id)
            .cloned()
            .collect();
        self.commit(next)?;
        Ok(true)
    }

    /// Writes `next` and only then adopts it, so a failed write leaves
    /// memory matching disk.
    fn commit(&mut self, next: Vec<Project>) -> anyhow::Result<()> {
        write_projects(&self.path, &next)?;
        self.projects = next;
        Ok(())
    }
}

fn write_projects(path: &Path, projects: &[Project]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(projects)?;
    std::fs::write(path, payload).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Returns the readable projects and how many entries were skipped.
fn read_projects(path: &Path) -> anyhow::Result<(Vec<Project>, usize)> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse saved projects in {}", path.display()))?;
    let Some(rows) = parsed.as_array() else {
        anyhow::bail!("saved projects in {} are not a list", path.display());
    };
    let projects: Vec<Project> = rows
        .iter()
        .filter_map(|row| serde_json::from_value::<Project>(row.clone()).ok())
        .collect();
    let skipped = rows.len() - projects.len();
    Ok((projects, skipped))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use crate::chart::ChartConfiguration;
    use crate::chat::Message;

    use super::{ProjectError, ProjectStore, MAX_PROJECTS};

    #[test]
    fn save_load_roundtrip() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        let saved = store.save(
            "Revenue",
            None,
            vec![Message::user("plot revenue", Vec::new())],
            Some(ChartConfiguration::empty()),
        )?;

        let reopened = ProjectStore::in_dir(temp.path());
        assert!(reopened.load_warning().is_none());
        let loaded = reopened
            .get(&saved.id)
            .ok_or_else(|| anyhow::anyhow!("saved project missing"))?;
        assert_eq!(loaded.name, "Revenue");
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.chart_config, Some(ChartConfiguration::empty()));
        Ok(())
    }

    #[test]
    fn newest_project_is_listed_first_and_resave_replaces() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        let first = store.save("first", None, Vec::new(), None)?;
        let second = store.save("second", None, Vec::new(), None)?;
        assert_eq!(store.list()[0].id, second.id);

        store.save("first renamed", Some(&first.id), Vec::new(), None)?;
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[1].name, "first renamed");
        Ok(())
    }

    #[test]
    fn stale_existing_id_creates_fresh_project() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        let saved = store.save("orphan", Some("gone"), Vec::new(), None)?;
        assert_ne!(saved.id, "gone");
        assert_eq!(store.len(), 1);
        assert!(store.get("gone").is_none());
        Ok(())
    }

    #[test]
    fn eleventh_project_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        for idx in 0..MAX_PROJECTS {
            store.save(&format!("p{idx}"), None, Vec::new(), None)?;
        }
        let err = store
            .save("one too many", None, Vec::new(), None)
            .err()
            .ok_or_else(|| anyhow::anyhow!("limit not enforced"))?;
        assert_eq!(
            err.downcast_ref::<ProjectError>(),
            Some(&ProjectError::LimitReached { max: MAX_PROJECTS })
        );

        let existing = store.list()[3].id.clone();
        store.save("still fine", Some(&existing), Vec::new(), None)?;
        assert_eq!(ProjectStore::in_dir(temp.path()).len(), MAX_PROJECTS);
        Ok(())
    }

    #[test]
    fn update_rename_delete() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        let project = store.save("draft", None, Vec::new(), None)?;

        let messages = vec![Message::assistant("done")];
        assert!(store.update(&project.id, &messages, Some(&ChartConfiguration::empty()))?);
        assert!(!store.update("missing", &messages, None)?);
        store.rename(&project.id, "  final ")?;

        let reopened = ProjectStore::in_dir(temp.path());
        let loaded = reopened
            .get(&project.id)
            .ok_or_else(|| anyhow::anyhow!("project missing"))?;
        assert_eq!(loaded.name, "final");
        assert_eq!(loaded.messages.len(), 1);
        assert!(loaded.last_modified >= project.last_modified);

        assert!(store.delete(&project.id)?);
        assert!(!store.delete(&project.id)?);
        assert!(ProjectStore::in_dir(temp.path()).is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_file_starts_empty_with_warning() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("projects.json"), "{not json")?;
        let store = ProjectStore::in_dir(temp.path());
        assert!(store.is_empty());
        assert!(store.load_warning().is_some());
        Ok(())
    }

    #[test]
    fn unreadable_entries_are_counted_in_warning() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        let kept = store.save("kept", None, Vec::new(), None)?;
        let mut rows: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(store.path())?)?;
        rows.push(serde_json::json!({"name": "no id"}));
        rows.push(serde_json::json!(42));
        std::fs::write(store.path(), serde_json::to_string(&rows)?)?;

        let reopened = ProjectStore::in_dir(temp.path());
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get(&kept.id).is_some());
        let warning = reopened
            .load_warning()
            .ok_or_else(|| anyhow::anyhow!("dropped entries not reported"))?;
        assert!(warning.starts_with("skipped 2 unreadable project(s)"));
        Ok(())
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let data_dir = temp.path().join("data");
        let mut store = ProjectStore::in_dir(&data_dir);
        let project = store.save("draft", None, Vec::new(), None)?;

        std::fs::remove_dir_all(&data_dir)?;
        std::fs::write(&data_dir, "not a directory")?;

        assert!(store.save("second", None, Vec::new(), None).is_err());
        assert_eq!(store.len(), 1);
        assert!(store
            .update(&project.id, &[Message::assistant("lost")], None)
            .is_err());
        assert!(store.rename(&project.id, "renamed").is_err());
        assert!(store.delete(&project.id).is_err());

        let current = store
            .get(&project.id)
            .ok_or_else(|| anyhow::anyhow!("project dropped from memory"))?;
        assert_eq!(current, &project);
        Ok(())
    }

    #[test]
    fn blank_name_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = ProjectStore::in_dir(temp.path());
        let err = store.save("   ", None, Vec::new(), None).err();
        assert_eq!(
            err.as_ref().and_then(|err| err.downcast_ref::<ProjectError>()),
            Some(&ProjectError::EmptyName)
        );
        Ok(())
    }
}
