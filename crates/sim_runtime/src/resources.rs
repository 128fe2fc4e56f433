//! Per-container file-backed resource area.
//!
//! Each container owns a directory subtree rooted at
//! `<base>/container_<id>`. All paths handed to the area are relative;
//! absolute paths and parent traversal are rejected.

use std::path::{Component, Path, PathBuf};

use sim_ecs::SimError;

/// File store rooted under one container's resource directory.
#[derive(Debug, Clone)]
pub struct ResourceArea {
    root: PathBuf,
}

impl ResourceArea {
    /// Create (or reopen) the resource area for a container.
    pub fn create(base: &Path, container_id: i64) -> Result<Self, SimError> {
        let root = base.join(format!("container_{container_id}"));
        std::fs::create_dir_all(&root).map_err(|e| {
            SimError::InvalidRequest(format!("cannot create resource area {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// The area's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the area.
    fn resolve(&self, relative: &str) -> Result<PathBuf, SimError> {
        let path = Path::new(relative);
        if path.is_absolute() {
            return Err(SimError::InvalidRequest(format!(
                "resource path must be relative: {relative}"
            )));
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(SimError::InvalidRequest(format!(
                        "resource path escapes the area: {relative}"
                    )))
                }
            }
        }
        Ok(self.root.join(path))
    }

    /// Read a resource.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>, SimError> {
        let path = self.resolve(relative)?;
        std::fs::read(&path).map_err(|_| SimError::NotFound(format!("resource {relative}")))
    }

    /// Write a resource, creating parent directories as needed.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> Result<(), SimError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SimError::InvalidRequest(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(&path, bytes)
            .map_err(|e| SimError::InvalidRequest(format!("cannot write {relative}: {e}")))
    }

    /// Returns `true` if the resource exists.
    #[must_use]
    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).map(|p| p.exists()).unwrap_or(false)
    }

    /// File names directly under a relative directory.
    pub fn list(&self, relative: &str) -> Result<Vec<String>, SimError> {
        let path = self.resolve(relative)?;
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(&path)
            .map_err(|e| SimError::InvalidRequest(format!("cannot list {relative}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> (tempfile::TempDir, ResourceArea) {
        let dir = tempfile::tempdir().unwrap();
        let area = ResourceArea::create(dir.path(), 1).unwrap();
        (dir, area)
    }

    #[test]
    fn test_root_per_container() {
        let (dir, area) = area();
        assert_eq!(area.root(), dir.path().join("container_1"));
        assert!(area.root().is_dir());
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_dir, area) = area();
        area.write("maps/alpine.json", b"{}").unwrap();
        assert!(area.exists("maps/alpine.json"));
        assert_eq!(area.read("maps/alpine.json").unwrap(), b"{}");
        assert_eq!(area.list("maps").unwrap(), vec!["alpine.json"]);
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let (_dir, area) = area();
        assert!(matches!(area.read("nope.bin"), Err(SimError::NotFound(_))));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, area) = area();
        assert!(matches!(
            area.read("../outside.txt"),
            Err(SimError::InvalidRequest(_))
        ));
        assert!(matches!(
            area.write("/etc/hosts", b"x"),
            Err(SimError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_areas_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = ResourceArea::create(dir.path(), 1).unwrap();
        let b = ResourceArea::create(dir.path(), 2).unwrap();
        a.write("shared.txt", b"a").unwrap();
        assert!(!b.exists("shared.txt"));
    }
}
