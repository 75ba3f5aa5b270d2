//! Repository records and their storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::error::PluginHostError;

/// A remote source of release indexes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    /// Location of the release index (directory or `.json` file)
    pub uri: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Repository {
    /// A new, enabled repository
    pub fn new(uri: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            uri: uri.into(),
            enabled: true,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }
}

/// Create/load/save/delete over repository records
pub trait RepositoryStore: Send + Sync {
    /// All repositories, in insertion order
    fn list(&self) -> Result<Vec<Repository>, PluginHostError>;

    /// Look up one repository
    fn get(&self, id: Uuid) -> Result<Option<Repository>, PluginHostError>;

    /// Create or overwrite a repository
    fn save(&self, repository: &Repository) -> Result<(), PluginHostError>;

    /// Remove a repository; returns false if it did not exist
    fn delete(&self, id: Uuid) -> Result<bool, PluginHostError>;

    /// Repositories the catalog should read
    fn enabled_repositories(&self) -> Result<Vec<Repository>, PluginHostError> {
        Ok(self.list()?.into_iter().filter(|r| r.enabled).collect())
    }
}

fn upsert(repositories: &mut Vec<Repository>, repository: &Repository) {
    match repositories.iter_mut().find(|r| r.id == repository.id) {
        Some(existing) => *existing = repository.clone(),
        None => repositories.push(repository.clone()),
    }
}

/// Repositories kept in memory
#[derive(Debug, Default)]
pub struct MemoryRepositoryStore {
    repositories: Mutex<Vec<Repository>>,
}

impl MemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RepositoryStore for MemoryRepositoryStore {
    fn list(&self) -> Result<Vec<Repository>, PluginHostError> {
        Ok(self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn get(&self, id: Uuid) -> Result<Option<Repository>, PluginHostError> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    fn save(&self, repository: &Repository) -> Result<(), PluginHostError> {
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        upsert(&mut repositories, repository);
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool, PluginHostError> {
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = repositories.len();
        repositories.retain(|r| r.id != id);
        Ok(repositories.len() != before)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryFile {
    #[serde(default)]
    repositories: Vec<Repository>,
}

/// Repositories persisted as a TOML file (`[[repositories]]` tables)
#[derive(Debug)]
pub struct TomlRepositoryStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl TomlRepositoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<RepositoryFile, PluginHostError> {
        if !self.path.exists() {
            return Ok(RepositoryFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| PluginHostError::Persistence(e.to_string()))
    }

    fn write(&self, file: &RepositoryFile) -> Result<(), PluginHostError> {
        let content =
            toml::to_string_pretty(file).map_err(|e| PluginHostError::Persistence(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl RepositoryStore for TomlRepositoryStore {
    fn list(&self) -> Result<Vec<Repository>, PluginHostError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.repositories)
    }

    fn get(&self, id: Uuid) -> Result<Option<Repository>, PluginHostError> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    fn save(&self, repository: &Repository) -> Result<(), PluginHostError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        upsert(&mut file.repositories, repository);
        self.write(&file)?;
        tracing::debug!(id = %repository.id, uri = %repository.uri, "Repository saved");
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool, PluginHostError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        let before = file.repositories.len();
        file.repositories.retain(|r| r.id != id);
        if file.repositories.len() == before {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_repository_is_enabled() {
        let repo = Repository::new("https://example.com/plugins/", "admin");
        assert!(repo.enabled);
        assert_eq!(repo.created_by, "admin");
    }

    #[test]
    fn test_toml_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = TomlRepositoryStore::new(dir.path().join("config/repositories.toml"));
        assert!(store.list().unwrap().is_empty());

        let mut first = Repository::new("https://a.example.com/", "admin");
        let second = Repository::new("file:///srv/plugins/", "admin");
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        first.enabled = false;
        store.save(&first).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], first);

        let enabled = store.enabled_repositories().unwrap();
        assert_eq!(enabled, vec![second.clone()]);

        assert!(store.delete(second.id).unwrap());
        assert!(!store.delete(second.id).unwrap());
        assert_eq!(store.get(first.id).unwrap(), Some(first));
    }

    #[test]
    fn test_missing_enabled_defaults_to_true() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repositories.toml");
        std::fs::write(
            &path,
            r#"
            [[repositories]]
            id = "67e55044-10b1-426f-9247-bb680e5fe0c8"
            uri = "https://example.com/"
            created_at = "2024-01-01T00:00:00Z"
            "#,
        )
        .unwrap();

        let store = TomlRepositoryStore::new(path);
        let repos = store.list().unwrap();
        assert_eq!(repos.len(), 1);
        assert!(repos[0].enabled);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryRepositoryStore::new();
        let repo = Repository::new("https://example.com/", "");
        store.save(&repo).unwrap();
        store.save(&repo).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.delete(repo.id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
