//! Shared fixtures: in-process modules described by small TOML archives
//! and a release source served from memory.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use modhost_core::{
    ConfigStore, IsolationBoundary, MemoryRepositoryStore, ModuleLoader, PluginHostError,
    PluginManager, PluginSettings, Release, ReleaseSource, Repository, RepositoryStore,
};
use modhost_plugin_api::{Plugin, PluginContext, PluginError, PluginManifest};
use serde::Deserialize;
use tempfile::TempDir;

pub const EXT: &str = "plugin";

/// Capability the fixture modules register
pub trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct VersionGreeter(String);

impl Greeter for VersionGreeter {
    fn greet(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Archive {
    id: String,
    version: String,
    #[serde(default)]
    requires: String,
    #[serde(default)]
    fail_start: bool,
    #[serde(default)]
    start_delay_ms: u64,
}

struct FixturePlugin(Archive);

impl Plugin for FixturePlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            id: self.0.id.clone(),
            version: self.0.version.clone(),
            requires: self.0.requires.clone(),
            ..Default::default()
        }
    }

    fn on_start(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        if self.0.start_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.0.start_delay_ms));
        }
        if self.0.fail_start {
            return Err(PluginError::custom("refusing to start"));
        }
        ctx.config_set("started", true)?;
        ctx.register_extension::<dyn Greeter>(Arc::new(VersionGreeter(format!(
            "{}@{}",
            self.0.id, self.0.version
        ))));
        Ok(())
    }
}

/// Loads `.plugin` TOML archives
pub struct FixtureLoader;

impl ModuleLoader for FixtureLoader {
    fn is_archive(&self, path: &Path) -> bool {
        path.is_file() && path.extension().is_some_and(|ext| ext == EXT)
    }

    fn open(&self, path: &Path) -> Result<IsolationBoundary, PluginHostError> {
        let content = std::fs::read_to_string(path)?;
        let archive: Archive =
            toml::from_str(&content).map_err(|e| PluginHostError::LoadFailure {
                module: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(IsolationBoundary::in_process(Box::new(FixturePlugin(
            archive,
        ))))
    }
}

pub fn archive(id: &str, version: &str, requires: &str) -> String {
    format!("id = \"{id}\"\nversion = \"{version}\"\nrequires = \"{requires}\"\n")
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .count()
        })
        .unwrap_or(0)
}

/// Release index and archives held in memory
#[derive(Default)]
pub struct MemorySource {
    releases: Mutex<Vec<Release>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn publish(&self, id: &str, version: &str, requires: &str, archive_body: &str) {
        let url = format!("mem://repo/{id}-{version}.{EXT}");
        self.releases.lock().unwrap().push(Release {
            module_id: id.to_string(),
            version: version.to_string(),
            download_url: url.clone(),
            requires: requires.to_string(),
            date: None,
        });
        self.archives
            .lock()
            .unwrap()
            .insert(url, archive_body.as_bytes().to_vec());
    }
}

#[async_trait]
impl ReleaseSource for MemorySource {
    async fn fetch_index(&self, _repository: &Repository) -> Result<Vec<Release>, PluginHostError> {
        Ok(self.releases.lock().unwrap().clone())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PluginHostError> {
        self.archives
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PluginHostError::update_failure(url, "not found"))
    }
}

pub struct TestHost {
    pub root: TempDir,
    pub manager: Arc<PluginManager>,
    pub source: Arc<MemorySource>,
}

impl TestHost {
    pub fn new(host_version: &str) -> Self {
        let root = TempDir::new().unwrap();
        let settings = PluginSettings {
            home_dir: root.path().join("plugins"),
            tmp_dir: root.path().join("tmp"),
            host_version: host_version.to_string(),
            ..Default::default()
        };
        let repositories = Arc::new(MemoryRepositoryStore::new());
        repositories
            .save(&Repository::new("mem://repo", "test"))
            .unwrap();
        let source = Arc::new(MemorySource::default());

        let manager = PluginManager::builder(
            settings,
            Arc::new(ConfigStore::in_memory()),
            repositories,
        )
        .with_loader(Arc::new(FixtureLoader))
        .with_source(source.clone())
        .build()
        .unwrap();

        Self {
            root,
            manager: Arc::new(manager),
            source,
        }
    }

    pub fn home(&self) -> PathBuf {
        self.root.path().join("plugins")
    }

    pub fn tmp(&self) -> PathBuf {
        self.root.path().join("tmp")
    }
}
