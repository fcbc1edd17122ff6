use crate::error::StoreError;
use crate::paths;
use crate::session::{planned_steps, SessionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ProjectHandle
// ---------------------------------------------------------------------------

/// A capture project: its default angle step and every session run for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHandle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub angle_step: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    /// Storage root of this project. Derived from the store on load.
    #[serde(skip)]
    pub path: PathBuf,
}

impl ProjectHandle {
    pub fn new(name: impl Into<String>, angle_step: u32) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            angle_step,
            created_at: now,
            updated_at: now,
            sessions: Vec::new(),
            path: PathBuf::new(),
        }
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        paths::session_dir(&self.path, session_id)
    }

    /// Insert `record`, or replace the stored session with the same id.
    pub fn upsert_session(&mut self, record: SessionRecord) {
        match self.sessions.iter_mut().find(|s| s.id == record.id) {
            Some(existing) => *existing = record,
            None => self.sessions.push(record),
        }
        self.updated_at = Utc::now();
    }

    /// Remove a session. Returns `false` if not present.
    pub fn remove_session(&mut self, session_id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != session_id);
        if self.sessions.len() < before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectStore
// ---------------------------------------------------------------------------

/// Durable project storage the orchestrator persists through.
pub trait ProjectStore: Send + Sync {
    fn load(&self, project_id: &str) -> Result<ProjectHandle, StoreError>;
    fn save(&self, project: &ProjectHandle) -> Result<(), StoreError>;
}

/// YAML manifests under `<root>/projects/<id>/project.yaml`.
#[derive(Debug, Clone)]
pub struct FsProjectStore {
    root: PathBuf,
}

impl FsProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        angle_step: u32,
    ) -> Result<ProjectHandle, StoreError> {
        planned_steps(angle_step)?;
        let mut project = ProjectHandle::new(name, angle_step);
        project.description = description.into();
        self.save(&project)?;
        project.path = paths::project_dir(&self.root, &project.id);
        Ok(project)
    }

    /// All readable projects, most recently updated first. Unreadable
    /// manifests are skipped.
    pub fn list(&self) -> Result<Vec<ProjectHandle>, StoreError> {
        let dir = paths::projects_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut projects = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load(&id) {
                Ok(p) => projects.push(p),
                Err(StoreError::ProjectNotFound(_)) => {}
                Err(e) => tracing::warn!(project = %id, error = %e, "skipping unreadable project"),
            }
        }
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    pub fn update(
        &self,
        project_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        angle_step: Option<u32>,
    ) -> Result<ProjectHandle, StoreError> {
        let mut project = self.load(project_id)?;
        if let Some(name) = name {
            project.name = name.to_string();
        }
        if let Some(description) = description {
            project.description = description.to_string();
        }
        if let Some(step) = angle_step {
            planned_steps(step)?;
            project.angle_step = step;
        }
        project.updated_at = Utc::now();
        self.save(&project)?;
        Ok(project)
    }

    /// Delete the project directory including every captured photo.
    pub fn delete(&self, project_id: &str) -> Result<(), StoreError> {
        paths::validate_id(project_id)?;
        let dir = paths::project_dir(&self.root, project_id);
        if !paths::project_manifest(&dir).exists() {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Remove a session from the manifest and delete its photo directory.
    pub fn delete_session(&self, project_id: &str, session_id: &str) -> Result<(), StoreError> {
        let mut project = self.load(project_id)?;
        paths::validate_id(session_id)?;
        if !project.remove_session(session_id) {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        self.save(&project)?;
        let dir = project.session_dir(session_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl ProjectStore for FsProjectStore {
    fn load(&self, project_id: &str) -> Result<ProjectHandle, StoreError> {
        paths::validate_id(project_id)?;
        let dir = paths::project_dir(&self.root, project_id);
        let manifest = paths::project_manifest(&dir);
        if !manifest.exists() {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }
        let data = std::fs::read_to_string(&manifest)?;
        let mut project: ProjectHandle = serde_yaml::from_str(&data)?;
        project.path = dir;
        Ok(project)
    }

    fn save(&self, project: &ProjectHandle) -> Result<(), StoreError> {
        paths::validate_id(&project.id)?;
        let dir = paths::project_dir(&self.root, &project.id);
        crate::io::ensure_dir(&dir.join(paths::SESSIONS_DIR))?;
        let data = serde_yaml::to_string(project)?;
        crate::io::atomic_write(&paths::project_manifest(&dir), data.as_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());

        let created = store.create("Vase", "blue glaze", 15).unwrap();
        assert!(created.path.join("project.yaml").exists());
        assert!(created.path.join("sessions").is_dir());

        let loaded = store.load(&created.id).unwrap();
        assert_eq!(loaded.name, "Vase");
        assert_eq!(loaded.description, "blue glaze");
        assert_eq!(loaded.angle_step, 15);
        assert_eq!(loaded.path, created.path);
    }

    #[test]
    fn create_rejects_invalid_step() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        assert!(matches!(
            store.create("bad", "", 0),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        assert!(matches!(
            store.load("nope"),
            Err(StoreError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn load_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        assert!(matches!(
            store.load("../etc"),
            Err(StoreError::InvalidId(_))
        ));
    }

    #[test]
    fn sessions_round_trip_through_manifest() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        let mut project = store.create("Mug", "", 90).unwrap();

        let mut record = SessionRecord::new("first", 90).unwrap();
        record
            .record_photo(0, project.session_dir(&record.id).join("angle_000.jpg"))
            .unwrap();
        project.upsert_session(record.clone());
        store.save(&project).unwrap();

        let loaded = store.load(&project.id).unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        assert_eq!(loaded.session(&record.id), Some(&record));

        record
            .record_photo(90, project.session_dir(&record.id).join("angle_090.jpg"))
            .unwrap();
        project.upsert_session(record.clone());
        assert_eq!(project.sessions.len(), 1);
        assert_eq!(project.sessions[0].photos.len(), 2);
    }

    #[test]
    fn list_sorted_newest_first_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        let a = store.create("a", "", 15).unwrap();
        let b = store.create("b", "", 15).unwrap();
        store.update(&a.id, Some("a2"), None, None).unwrap();

        let broken = dir.path().join("projects/broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("project.yaml"), "::: not yaml").unwrap();
        std::fs::create_dir_all(dir.path().join("projects/empty")).unwrap();

        let projects = store.list().unwrap();
        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
        assert_eq!(projects[0].name, "a2");
    }

    #[test]
    fn update_validates_angle_step() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        let p = store.create("p", "", 15).unwrap();
        assert!(store.update(&p.id, None, None, Some(400)).is_err());
        let updated = store.update(&p.id, None, Some("new"), Some(30)).unwrap();
        assert_eq!(updated.angle_step, 30);
        assert_eq!(updated.description, "new");
    }

    #[test]
    fn delete_removes_directory() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        let p = store.create("p", "", 15).unwrap();
        store.delete(&p.id).unwrap();
        assert!(!p.path.exists());
        assert!(matches!(
            store.delete(&p.id),
            Err(StoreError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn delete_session_removes_record_and_photos() {
        let dir = TempDir::new().unwrap();
        let store = FsProjectStore::new(dir.path());
        let mut project = store.create("p", "", 180).unwrap();
        let record = SessionRecord::new("s", 180).unwrap();
        let session_dir = project.session_dir(&record.id);
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(session_dir.join("angle_000.jpg"), b"jpg").unwrap();
        project.upsert_session(record.clone());
        store.save(&project).unwrap();

        store.delete_session(&project.id, &record.id).unwrap();
        assert!(!session_dir.exists());
        assert!(store.load(&project.id).unwrap().sessions.is_empty());
        assert!(matches!(
            store.delete_session(&project.id, &record.id),
            Err(StoreError::SessionNotFound(_))
        ));
    }
}
