//! PluginManager - wires the registry, installer and catalog together

use std::sync::Arc;

use modhost_plugin_api::SettingsPanel;
use uuid::Uuid;

use crate::config_store::ConfigStore;
use crate::demo;
use crate::error::PluginHostError;
use crate::plugins::{
    DylibLoader, ModuleLoader, PluginInfo, PluginRegistry, PluginState, StagingInstaller,
};
use crate::services::HostContext;
use crate::settings::PluginSettings;
use crate::update::{HttpReleaseSource, ReleaseSource, Repository, RepositoryStore, UpdateCatalog};

/// Answers whether the current caller may perform an action
///
/// Actions are namespaced, e.g. `plugins.upload`.
pub trait Permissions: Send + Sync {
    fn is_permitted(&self, action: &str) -> bool;
}

impl<F> Permissions for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_permitted(&self, action: &str) -> bool {
        self(action)
    }
}

/// Permits everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Permissions for AllowAll {
    fn is_permitted(&self, _action: &str) -> bool {
        true
    }
}

/// Builder for [`PluginManager`]
pub struct PluginManagerBuilder {
    settings: PluginSettings,
    config: Arc<ConfigStore>,
    repositories: Arc<dyn RepositoryStore>,
    loader: Arc<dyn ModuleLoader>,
    source: Arc<dyn ReleaseSource>,
    permissions: Arc<dyn Permissions>,
}

impl PluginManagerBuilder {
    /// Use a different archive loader (default: [`DylibLoader`])
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Use a different release source (default: [`HttpReleaseSource`])
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ReleaseSource>) -> Self {
        self.source = source;
        self
    }

    /// Use a permissions collaborator (default: [`AllowAll`])
    #[must_use]
    pub fn with_permissions(mut self, permissions: Arc<dyn Permissions>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn build(self) -> Result<PluginManager, PluginHostError> {
        let services = Arc::new(HostContext::new(
            self.settings.host_version.clone(),
            Arc::clone(&self.config),
        ));
        let registry = Arc::new(PluginRegistry::new(
            self.settings.clone(),
            self.loader,
            services,
        )?);
        let installer = Arc::new(StagingInstaller::new(Arc::clone(&registry)));
        let catalog = Arc::new(UpdateCatalog::new(
            Arc::clone(&installer),
            Arc::clone(&self.repositories),
            self.source,
        ));

        Ok(PluginManager {
            settings: self.settings,
            registry,
            installer,
            catalog,
            config: self.config,
            repositories: self.repositories,
            permissions: self.permissions,
        })
    }
}

/// Entry point for hosts: lifecycle, installs, updates and repositories
pub struct PluginManager {
    settings: PluginSettings,
    registry: Arc<PluginRegistry>,
    installer: Arc<StagingInstaller>,
    catalog: Arc<UpdateCatalog>,
    config: Arc<ConfigStore>,
    repositories: Arc<dyn RepositoryStore>,
    permissions: Arc<dyn Permissions>,
}

impl PluginManager {
    pub fn builder(
        settings: PluginSettings,
        config: Arc<ConfigStore>,
        repositories: Arc<dyn RepositoryStore>,
    ) -> PluginManagerBuilder {
        PluginManagerBuilder {
            settings,
            config,
            repositories,
            loader: Arc::new(DylibLoader),
            source: Arc::new(HttpReleaseSource::new()),
            permissions: Arc::new(AllowAll),
        }
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn installer(&self) -> &Arc<StagingInstaller> {
        &self.installer
    }

    pub fn catalog(&self) -> &Arc<UpdateCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn repositories(&self) -> &Arc<dyn RepositoryStore> {
        &self.repositories
    }

    // ─── Permissions ─────────────────────────────────────────────────

    /// Whether `plugins.<action>` is permitted
    pub fn is_permitted(&self, action: &str) -> bool {
        self.permissions.is_permitted(&format!("plugins.{action}"))
    }

    fn check(&self, action: &str) -> Result<(), PluginHostError> {
        if self.is_permitted(action) {
            Ok(())
        } else {
            tracing::warn!(action, "Permission denied");
            Err(PluginHostError::PermissionDenied {
                action: format!("plugins.{action}"),
            })
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Prepare the home and temp directories and, with autoload on, load
    /// and start every module in the home directory
    ///
    /// Returns the ids admitted.
    pub fn startup(&self) -> Result<Vec<String>, PluginHostError> {
        std::fs::create_dir_all(&self.settings.home_dir)?;
        std::fs::create_dir_all(&self.settings.tmp_dir)?;

        if !self.settings.autoload {
            tracing::info!("Autoload disabled, not loading plugins");
            return Ok(Vec::new());
        }

        let loaded = self.registry.scan_and_load(&self.settings.home_dir)?;
        self.registry.start_all();
        tracing::info!(count = loaded.len(), "Plugins loaded at startup");
        Ok(loaded)
    }

    /// Stop every running module
    pub fn shutdown(&self) {
        self.registry.stop_all();
    }

    /// Refresh the catalog, then stop, unload, reload and restart everything
    pub async fn reload(&self) -> Result<(), PluginHostError> {
        self.check("reload")?;
        if let Err(e) = self.catalog.refresh().await {
            tracing::warn!(error = %e, "Catalog refresh failed during reload");
        }

        let registry = Arc::clone(&self.registry);
        let home = self.settings.home_dir.clone();
        tokio::task::spawn_blocking(move || {
            registry.stop_all();
            registry.unload_all();
            let loaded = registry.scan_and_load(&home)?;
            registry.start_all();
            tracing::info!(count = loaded.len(), "Plugins reloaded");
            Ok::<_, PluginHostError>(())
        })
        .await
        .map_err(|e| PluginHostError::TaskFailed {
            task: "reload".to_string(),
            reason: e.to_string(),
        })?
    }

    pub fn start(&self, id: &str) -> Result<PluginState, PluginHostError> {
        self.check("start")?;
        self.registry.start(id)
    }

    pub fn stop(&self, id: &str) -> Result<PluginState, PluginHostError> {
        self.check("stop")?;
        self.registry.stop(id)
    }

    pub fn enable(&self, id: &str) -> Result<bool, PluginHostError> {
        self.check("enable")?;
        self.registry.enable(id)
    }

    pub fn disable(&self, id: &str) -> Result<bool, PluginHostError> {
        self.check("disable")?;
        self.registry.disable(id)
    }

    pub fn delete(&self, id: &str) -> Result<bool, PluginHostError> {
        self.check("delete")?;
        self.registry.delete(id)
    }

    /// Install an uploaded archive and start it
    pub fn install(&self, file_name: &str, bytes: &[u8]) -> Result<String, PluginHostError> {
        self.check("upload")?;
        let id = self.installer.install(file_name, bytes)?;
        let state = self.registry.start(&id)?;
        tracing::info!(plugin = %id, state = %state, "Plugin installed");
        Ok(id)
    }

    /// Apply the best available update for one module
    pub async fn update(&self, id: &str) -> Result<bool, PluginHostError> {
        self.check("update")?;
        Ok(self.catalog.apply(id).await)
    }

    /// Apply every available update
    pub async fn update_all(&self) -> Result<bool, PluginHostError> {
        self.check("update")?;
        Ok(self.catalog.update_all().await)
    }

    // ─── Presentation ────────────────────────────────────────────────

    /// Loaded modules, plus the demo entries when `dummy` is set
    pub fn display_plugins(&self) -> Vec<PluginInfo> {
        let mut plugins = self.registry.plugins();
        if self.settings.dummy {
            plugins.extend(demo::demo_plugins());
        }
        plugins
    }

    /// Settings panel registered by a started module
    pub fn settings_panel(&self, id: &str) -> Option<Arc<dyn SettingsPanel>> {
        self.registry
            .get_extensions_for::<dyn SettingsPanel>(id)
            .into_iter()
            .next()
    }

    // ─── Repositories ────────────────────────────────────────────────

    /// Add a repository and refresh the catalog
    pub async fn add_repository(
        &self,
        uri: &str,
        created_by: &str,
    ) -> Result<Repository, PluginHostError> {
        self.check("repositories")?;
        let repository = Repository::new(uri, created_by);
        self.repositories.save(&repository)?;
        self.catalog.repositories_changed().await?;
        Ok(repository)
    }

    /// Toggle a repository and refresh the catalog; false if unknown
    pub async fn set_repository_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> Result<bool, PluginHostError> {
        self.check("repositories")?;
        let Some(mut repository) = self.repositories.get(id)? else {
            return Ok(false);
        };
        repository.enabled = enabled;
        self.repositories.save(&repository)?;
        self.catalog.repositories_changed().await?;
        Ok(true)
    }

    /// Remove a repository and refresh the catalog; false if unknown
    pub async fn remove_repository(&self, id: Uuid) -> Result<bool, PluginHostError> {
        self.check("repositories")?;
        if !self.repositories.delete(id)? {
            return Ok(false);
        }
        self.catalog.repositories_changed().await?;
        Ok(true)
    }
}
