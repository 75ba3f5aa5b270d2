//! UpdateCatalog - aggregated releases and update application

use arc_swap::ArcSwap;
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;

use super::repository::RepositoryStore;
use super::source::{Release, ReleaseSource};
use crate::error::PluginHostError;
use crate::plugins::{ModuleDescriptor, PluginRegistry, StagingInstaller};
use crate::version::{self, VersionResolver};

type ReleaseMap = HashMap<String, Vec<Release>>;

/// Releases from all enabled repositories, keyed by module id
///
/// The map is rebuilt by [`UpdateCatalog::refresh`] and swapped in whole, so
/// readers see either the previous or the new catalog.
pub struct UpdateCatalog {
    installer: Arc<StagingInstaller>,
    repositories: Arc<dyn RepositoryStore>,
    source: Arc<dyn ReleaseSource>,
    resolver: VersionResolver,
    releases: ArcSwap<ReleaseMap>,
}

impl UpdateCatalog {
    pub fn new(
        installer: Arc<StagingInstaller>,
        repositories: Arc<dyn RepositoryStore>,
        source: Arc<dyn ReleaseSource>,
    ) -> Self {
        let resolver = VersionResolver::new(installer.registry().settings().exact_version);
        Self {
            installer,
            repositories,
            source,
            resolver,
            releases: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    fn registry(&self) -> &Arc<PluginRegistry> {
        self.installer.registry()
    }

    /// Re-read enabled repositories and rebuild the release map
    ///
    /// A repository whose index cannot be fetched is skipped. Returns the
    /// number of releases now in the catalog.
    pub async fn refresh(&self) -> Result<usize, PluginHostError> {
        let repositories = self.repositories.enabled_repositories()?;

        let mut map = ReleaseMap::new();
        for repository in &repositories {
            match self.source.fetch_index(repository).await {
                Ok(releases) => {
                    tracing::debug!(
                        repository = %repository.uri,
                        releases = releases.len(),
                        "Fetched release index"
                    );
                    for release in releases {
                        map.entry(release.module_id.clone()).or_default().push(release);
                    }
                }
                Err(e) => {
                    tracing::warn!(repository = %repository.uri, error = %e, "Skipping repository");
                }
            }
        }

        let total = map.values().map(Vec::len).sum();
        self.releases.store(Arc::new(map));
        tracing::info!(
            repositories = repositories.len(),
            releases = total,
            "Update catalog refreshed"
        );
        Ok(total)
    }

    /// Notify the catalog that the repository set changed
    pub async fn repositories_changed(&self) -> Result<usize, PluginHostError> {
        self.refresh().await
    }

    /// Releases known for one module, in repository order
    pub fn releases(&self, module_id: &str) -> Vec<Release> {
        self.releases
            .load()
            .get(module_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ids of every module the catalog knows releases for
    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.releases.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Highest applicable release newer than the installed module
    ///
    /// A release applies when its version is strictly newer than
    /// `installed.version` and the running host satisfies its `requires`.
    /// Always `None` when version checking is off.
    pub fn outdated(&self, installed: &ModuleDescriptor) -> Result<Option<Release>, PluginHostError> {
        let settings = self.registry().settings();
        if !settings.version_check {
            return Ok(None);
        }
        let host = settings.enforced_host_version();
        let current = version::parse_version(&installed.version)?;

        let mut best: Option<(Version, Release)> = None;
        for release in self.releases(&installed.id) {
            let candidate = version::parse_version(&release.version)?;
            if candidate <= current {
                continue;
            }
            if let Some(host) = host
                && !self.resolver.satisfies(host, &release.requires)?
            {
                tracing::debug!(
                    plugin = %installed.id,
                    version = %release.version,
                    requires = %release.requires,
                    "Release needs a newer host"
                );
                continue;
            }
            if best.as_ref().is_none_or(|(v, _)| candidate > *v) {
                best = Some((candidate, release));
            }
        }

        Ok(best.map(|(_, release)| release))
    }

    /// Applicable releases for every loaded module
    ///
    /// A module whose releases cannot be evaluated is logged and skipped.
    pub fn list_outdated(&self) -> Result<Vec<Release>, PluginHostError> {
        let mut outdated = Vec::new();
        for info in self.registry().plugins() {
            match self.outdated(&info.descriptor) {
                Ok(Some(release)) => outdated.push(release),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        plugin = %info.descriptor.id,
                        state = %info.state,
                        error = %e,
                        "Skipping plugin in outdated check"
                    );
                }
            }
        }
        Ok(outdated)
    }

    /// Download, stage and swap in the best release for `id`
    ///
    /// Returns false if any step fails; the installed version then stays
    /// loaded in its previous state.
    pub async fn apply(&self, id: &str) -> bool {
        match self.try_apply(id).await {
            Ok(descriptor) => {
                tracing::info!(plugin = %id, version = %descriptor.version, "Update applied");
                true
            }
            Err(e) => {
                tracing::warn!(plugin = %id, error = %e, "Update failed");
                false
            }
        }
    }

    /// Apply every outdated module; true only if all succeeded
    pub async fn update_all(&self) -> bool {
        let outdated = match self.list_outdated() {
            Ok(outdated) => outdated,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot determine outdated plugins");
                return false;
            }
        };

        let mut all = true;
        for release in outdated {
            all &= self.apply(&release.module_id).await;
        }
        all
    }

    async fn try_apply(&self, id: &str) -> Result<ModuleDescriptor, PluginHostError> {
        let installed = self
            .registry()
            .plugin(id)
            .ok_or_else(|| PluginHostError::NotFound { id: id.to_string() })?
            .descriptor;
        let release = self
            .outdated(&installed)?
            .ok_or_else(|| PluginHostError::update_failure(id, "no applicable release"))?;

        let bytes = self
            .source
            .download(&release.download_url)
            .await
            .map_err(|e| PluginHostError::update_failure(id, e))?;
        let file_name = archive_file_name(&release);

        let installer = Arc::clone(&self.installer);
        let expected = id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut staged = installer.stage(&file_name, &bytes)?;
            if staged.descriptor.id != expected {
                let found = staged.descriptor.id.clone();
                installer.discard(staged);
                return Err(PluginHostError::update_failure(
                    &expected,
                    format!("downloaded archive contains module '{found}'"),
                ));
            }
            // The old archive stays in place until the swap succeeds
            staged.file_name = installer.unclaimed_file_name(&file_name, &release.version);
            let path = installer.commit(staged)?;
            installer.registry().replace(&expected, &path)
        })
        .await
        .map_err(|e| PluginHostError::update_failure(id, e))?
    }
}

/// Preferred file name for a downloaded release: the URL's last path segment
fn archive_file_name(release: &Release) -> String {
    url::Url::parse(&release.download_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}-{}", release.module_id, release.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{ScriptedLoader, script, write_archive};
    use crate::settings::PluginSettings;
    use crate::update::{MemoryRepositoryStore, Repository};
    use crate::PluginState;
    use async_trait::async_trait;
    use modhost_plugin_api::StaticServices;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves releases and archive bytes from memory
    #[derive(Default)]
    struct MemorySource {
        releases: Mutex<Vec<Release>>,
        archives: Mutex<HashMap<String, Vec<u8>>>,
        failing_uri: Option<String>,
    }

    impl MemorySource {
        fn publish(&self, id: &str, version: &str, requires: &str, archive: Option<String>) {
            let url = format!("mem://repo/{id}-{version}.module.toml");
            self.publish_at(&url, id, version, requires, archive);
        }

        fn publish_at(
            &self,
            url: &str,
            id: &str,
            version: &str,
            requires: &str,
            archive: Option<String>,
        ) {
            let url = url.to_string();
            self.releases.lock().unwrap().push(Release {
                module_id: id.to_string(),
                version: version.to_string(),
                download_url: url.clone(),
                requires: requires.to_string(),
                date: None,
            });
            if let Some(bytes) = archive {
                self.archives.lock().unwrap().insert(url, bytes.into_bytes());
            }
        }
    }

    #[async_trait]
    impl ReleaseSource for MemorySource {
        async fn fetch_index(&self, repository: &Repository) -> Result<Vec<Release>, PluginHostError> {
            if self.failing_uri.as_deref() == Some(repository.uri.as_str()) {
                return Err(PluginHostError::update_failure(&repository.uri, "unreachable"));
            }
            Ok(self.releases.lock().unwrap().clone())
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, PluginHostError> {
            self.archives
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| PluginHostError::update_failure(url, "404"))
        }
    }

    struct Fixture {
        _root: TempDir,
        home: PathBuf,
        registry: Arc<PluginRegistry>,
        source: Arc<MemorySource>,
        catalog: UpdateCatalog,
    }

    fn fixture(host_version: &str, source: MemorySource) -> Fixture {
        let root = TempDir::new().unwrap();
        let home = root.path().join("plugins");
        std::fs::create_dir_all(&home).unwrap();
        let settings = PluginSettings {
            home_dir: home.clone(),
            tmp_dir: root.path().join("tmp"),
            host_version: host_version.to_string(),
            ..Default::default()
        };
        let registry = Arc::new(
            PluginRegistry::new(
                settings,
                Arc::new(ScriptedLoader),
                Arc::new(StaticServices::new(host_version)),
            )
            .unwrap(),
        );
        let installer = Arc::new(StagingInstaller::new(registry.clone()));
        let repositories = Arc::new(MemoryRepositoryStore::new());
        repositories.save(&Repository::new("mem://repo", "test")).unwrap();
        repositories.save(&Repository::new("mem://down", "test")).unwrap();

        let source = Arc::new(source);
        let catalog = UpdateCatalog::new(installer, repositories, source.clone());
        Fixture {
            _root: root,
            home,
            registry,
            source,
            catalog,
        }
    }

    fn failing_down() -> MemorySource {
        MemorySource {
            failing_uri: Some("mem://down".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_skips_failing_repository() {
        let f = fixture("1.0.0", failing_down());
        f.source.publish("x", "1.1.0", "", None);

        let total = f.catalog.refresh().await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(f.catalog.module_ids(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_outdated_picks_highest_not_first_or_last() {
        let f = fixture("1.0.0", failing_down());
        write_archive(&f.home, "x", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        for version in ["1.0.0", "1.2.0", "1.1.0"] {
            f.source.publish("x", version, "", None);
        }
        f.catalog.refresh().await.unwrap();

        let installed = f.registry.plugin("x").unwrap().descriptor;
        let release = f.catalog.outdated(&installed).unwrap().unwrap();
        assert_eq!(release.version, "1.2.0");
    }

    #[tokio::test]
    async fn test_outdated_ignores_releases_needing_newer_host() {
        let f = fixture("2.0.0", failing_down());
        write_archive(&f.home, "x", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.source.publish("x", "1.1.0", ">=2.0.0", None);
        f.source.publish("x", "3.0.0", ">=3.0.0", None);
        f.catalog.refresh().await.unwrap();

        let installed = f.registry.plugin("x").unwrap().descriptor;
        let release = f.catalog.outdated(&installed).unwrap().unwrap();
        assert_eq!(release.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_outdated_none_when_up_to_date() {
        let f = fixture("1.0.0", failing_down());
        write_archive(&f.home, "x", "1.2.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.source.publish("x", "1.2.0", "", None);
        f.source.publish("x", "1.1.0", "", None);
        f.catalog.refresh().await.unwrap();

        let installed = f.registry.plugin("x").unwrap().descriptor;
        assert!(f.catalog.outdated(&installed).unwrap().is_none());
        assert!(f.catalog.list_outdated().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_swaps_in_new_version() {
        let f = fixture("1.0.0", failing_down());
        let old = write_archive(&f.home, "x", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.registry.start("x").unwrap();
        f.source
            .publish("x", "2.0.0", "", Some(script("x", "2.0.0", "", "")));
        f.catalog.refresh().await.unwrap();

        assert!(f.catalog.apply("x").await);

        let info = f.registry.plugin("x").unwrap();
        assert_eq!(info.descriptor.version, "2.0.0");
        assert_eq!(info.state, PluginState::Started);
        assert!(!old.exists());
        assert!(f.catalog.list_outdated().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_missing_archive_keeps_old_version() {
        let f = fixture("1.0.0", failing_down());
        write_archive(&f.home, "x", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.registry.start("x").unwrap();
        f.source.publish("x", "2.0.0", "", None);
        f.catalog.refresh().await.unwrap();

        assert!(!f.catalog.apply("x").await);
        let info = f.registry.plugin("x").unwrap();
        assert_eq!(info.descriptor.version, "1.0.0");
        assert_eq!(info.state, PluginState::Started);
    }

    #[tokio::test]
    async fn test_apply_rejects_archive_with_other_id() {
        let f = fixture("1.0.0", failing_down());
        write_archive(&f.home, "x", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.source
            .publish("x", "2.0.0", "", Some(script("y", "2.0.0", "", "")));
        f.catalog.refresh().await.unwrap();

        assert!(!f.catalog.apply("x").await);
        assert!(f.registry.plugin("y").is_none());
        assert_eq!(f.registry.plugin("x").unwrap().descriptor.version, "1.0.0");
    }

    #[tokio::test]
    async fn test_version_check_off_disables_updates() {
        let root = TempDir::new().unwrap();
        let settings = PluginSettings {
            home_dir: root.path().to_path_buf(),
            version_check: false,
            ..Default::default()
        };
        let registry = Arc::new(
            PluginRegistry::new(
                settings,
                Arc::new(ScriptedLoader),
                Arc::new(StaticServices::default()),
            )
            .unwrap(),
        );
        write_archive(root.path(), "x", "1.0.0", "", "");
        registry.scan_and_load(root.path()).unwrap();

        let source = Arc::new(MemorySource::default());
        source.publish("x", "9.0.0", "", None);
        let repositories = Arc::new(MemoryRepositoryStore::new());
        repositories.save(&Repository::new("mem://repo", "test")).unwrap();
        let catalog = UpdateCatalog::new(
            Arc::new(StagingInstaller::new(registry.clone())),
            repositories,
            source,
        );
        catalog.refresh().await.unwrap();

        let installed = registry.plugin("x").unwrap().descriptor;
        assert!(catalog.outdated(&installed).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_module_does_not_block_batch_updates() {
        let f = fixture("1.0.0", failing_down());
        write_archive(&f.home, "bad", "one.two", "", "");
        write_archive(&f.home, "x", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.source
            .publish("x", "2.0.0", "", Some(script("x", "2.0.0", "", "")));
        f.catalog.refresh().await.unwrap();

        let bad = f.registry.plugin("bad").unwrap();
        assert_eq!(bad.state, PluginState::Failed);
        assert!(f.catalog.outdated(&bad.descriptor).is_err());

        let outdated = f.catalog.list_outdated().unwrap();
        assert_eq!(outdated.len(), 1);
        assert_eq!(outdated[0].module_id, "x");

        assert!(f.catalog.update_all().await);
        assert_eq!(f.registry.plugin("x").unwrap().descriptor.version, "2.0.0");
    }

    #[tokio::test]
    async fn test_apply_never_overwrites_another_modules_archive() {
        let f = fixture("1.0.0", failing_down());
        let shared = f.home.join("shared.module.toml");
        std::fs::write(&shared, script("a", "1.0.0", "", "")).unwrap();
        write_archive(&f.home, "b", "1.0.0", "", "");
        f.registry.scan_and_load(&f.home).unwrap();
        f.source.publish_at(
            "mem://repo/dl/shared.module.toml",
            "b",
            "2.0.0",
            "",
            Some(script("b", "2.0.0", "", "")),
        );
        f.catalog.refresh().await.unwrap();

        assert!(f.catalog.apply("b").await);

        let a = f.registry.plugin("a").unwrap().descriptor;
        let b = f.registry.plugin("b").unwrap().descriptor;
        assert_eq!(a.path, shared);
        assert_ne!(b.path, a.path);
        assert_eq!(b.version, "2.0.0");
        assert!(std::fs::read_to_string(&shared).unwrap().contains("id = \"a\""));

        assert!(f.registry.delete("a").unwrap());
        assert!(b.path.exists());
    }

    #[test]
    fn test_archive_file_name_from_url() {
        let mut release = Release {
            module_id: "x".into(),
            version: "2.0.0".into(),
            download_url: "https://example.com/dl/x.so".into(),
            requires: String::new(),
            date: None,
        };
        assert_eq!(archive_file_name(&release), "x.so");
        release.download_url = "https://example.com/".into();
        assert_eq!(archive_file_name(&release), "x-2.0.0");
    }
}
