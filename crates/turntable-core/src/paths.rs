use crate::error::StoreError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DEFAULT_ROOT_DIR: &str = "turntable-projects";
pub const PROJECTS_DIR: &str = "projects";
pub const SESSIONS_DIR: &str = "sessions";

pub const CONFIG_FILE: &str = "config.yaml";
pub const MANIFEST_FILE: &str = "project.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `~/turntable-projects`, used when no root is given explicitly.
pub fn default_root() -> Result<PathBuf, StoreError> {
    home::home_dir()
        .map(|h| h.join(DEFAULT_ROOT_DIR))
        .ok_or(StoreError::HomeNotFound)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn projects_dir(root: &Path) -> PathBuf {
    root.join(PROJECTS_DIR)
}

pub fn project_dir(root: &Path, project_id: &str) -> PathBuf {
    projects_dir(root).join(project_id)
}

pub fn project_manifest(project_dir: &Path) -> PathBuf {
    project_dir.join(MANIFEST_FILE)
}

pub fn session_dir(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(SESSIONS_DIR).join(session_id)
}

pub fn photo_file_name(angle: u32) -> String {
    format!("angle_{angle:03}.jpg")
}

pub fn photo_path(session_dir: &Path, angle: u32) -> PathBuf {
    session_dir.join(photo_file_name(angle))
}

// ---------------------------------------------------------------------------
// Id validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

/// Project and session ids become directory names; reject anything that
/// could escape the projects directory.
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.len() > 64 || !id_re().is_match(id) {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        for id in [
            "8f14e45f-ceea-467f-a0e6-b9c3c1f0d9a1",
            "a",
            "vase_2024",
            "X1",
        ] {
            validate_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "../escape", "-leading", "has space", "a/b", "."] {
            assert!(validate_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn photo_names_are_zero_padded() {
        assert_eq!(photo_file_name(0), "angle_000.jpg");
        assert_eq!(photo_file_name(15), "angle_015.jpg");
        assert_eq!(photo_file_name(345), "angle_345.jpg");
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/rig");
        assert_eq!(config_path(root), PathBuf::from("/tmp/rig/config.yaml"));
        let project = project_dir(root, "p1");
        assert_eq!(project, PathBuf::from("/tmp/rig/projects/p1"));
        assert_eq!(
            project_manifest(&project),
            PathBuf::from("/tmp/rig/projects/p1/project.yaml")
        );
        assert_eq!(
            photo_path(&session_dir(&project, "s1"), 30),
            PathBuf::from("/tmp/rig/projects/p1/sessions/s1/angle_030.jpg")
        );
    }
}
