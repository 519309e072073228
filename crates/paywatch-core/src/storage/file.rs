use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::StorageError;

/// A single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the document. `Ok(None)` means the file has never been written.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.corrupted(e))?;
        let value = serde_json::from_str(&contents).map_err(|e| self.corrupted(e))?;

        debug!(path = %self.path.display(), "Loaded stored state");
        Ok(Some(value))
    }

    /// Replace the document atomically.
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.write_failed(e))?;
        }

        let contents = serde_json::to_string_pretty(value)?;
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, contents).map_err(|e| self.write_failed(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.write_failed(e))?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupted(&self, reason: impl std::fmt::Display) -> StorageError {
        StorageError::Corrupted {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_failed(&self, source: std::io::Error) -> StorageError {
        StorageError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().expect("create temp dir");
        let file = JsonFile::new(dir.path().join("absent.json"));
        let loaded: Option<BTreeMap<String, String>> = file.load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp_file() {
        let dir = TempDir::new().expect("create temp dir");
        let file = JsonFile::new(dir.path().join("nested").join("state.json"));

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "1".to_string());
        file.save(&map).unwrap();

        assert!(file.exists());
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
        let loaded: BTreeMap<String, String> = file.load().unwrap().unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_malformed_file_is_corruption() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFile::new(&path)
            .load::<BTreeMap<String, String>>()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::Corrupted { .. })
        ));
    }
}
