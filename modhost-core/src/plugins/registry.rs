//! PluginRegistry - owns loaded modules and drives their lifecycle
//!
//! Every lifecycle mutation goes through one registry-wide lock. After each
//! mutation a fresh snapshot of all modules is published through `arc-swap`,
//! so readers never wait on a running hook and never see a module
//! mid-transition.

use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modhost_plugin_api::{HostServices, PluginContext};

use super::disabled::{DISABLED_FILE, DisabledPlugins};
use super::extensions::ExtensionRegistry;
use super::loader::{IsolationBoundary, ModuleLoader};
use super::state::{FailureCause, ModuleDescriptor, PluginInfo, PluginState};
use crate::error::PluginHostError;
use crate::settings::PluginSettings;
use crate::version::{self, VersionResolver};

/// A loaded module with its runtime state
struct LoadedModule {
    descriptor: ModuleDescriptor,
    state: PluginState,
    failure: Option<FailureCause>,
    /// Context handed to the start/stop hooks
    context: PluginContext,
    /// Declared last so the instance and library are released after the
    /// rest of the entry
    boundary: IsolationBoundary,
}

impl LoadedModule {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            descriptor: self.descriptor.clone(),
            state: self.state,
            failure: self.failure.clone(),
        }
    }

    fn transition(&mut self, next: PluginState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(plugin = %self.descriptor.id, from = %self.state, to = %next, "State change");
        self.state = next;
    }
}

/// Mutable registry state, guarded by the registry lock
#[derive(Default)]
struct RegistryState {
    modules: HashMap<String, LoadedModule>,
    disabled: DisabledPlugins,
}

impl RegistryState {
    fn holds_path(&self, path: &Path) -> bool {
        self.modules.values().any(|m| m.descriptor.path == path)
    }

    fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// The plugin registry manages loading, starting, stopping and unloading modules
pub struct PluginRegistry {
    settings: PluginSettings,
    resolver: VersionResolver,
    loader: Arc<dyn ModuleLoader>,
    services: Arc<dyn HostServices>,
    extensions: Arc<ExtensionRegistry>,
    state: Mutex<RegistryState>,
    snapshot: ArcSwap<BTreeMap<String, PluginInfo>>,
}

impl PluginRegistry {
    /// Create a registry for the configured home directory
    ///
    /// Reads the persisted disabled list; nothing is loaded yet.
    pub fn new(
        settings: PluginSettings,
        loader: Arc<dyn ModuleLoader>,
        services: Arc<dyn HostServices>,
    ) -> Result<Self, PluginHostError> {
        let disabled = DisabledPlugins::load(&settings.home_dir.join(DISABLED_FILE))?;
        Ok(Self {
            resolver: VersionResolver::new(settings.exact_version),
            settings,
            loader,
            services,
            extensions: Arc::new(ExtensionRegistry::new()),
            state: Mutex::new(RegistryState {
                modules: HashMap::new(),
                disabled,
            }),
            snapshot: ArcSwap::from_pointee(BTreeMap::new()),
        })
    }

    /// Settings the registry was created with
    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Shared extension registry
    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// Loader used to open archives
    pub fn loader(&self) -> &Arc<dyn ModuleLoader> {
        &self.loader
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &RegistryState) {
        let snapshot = state
            .modules
            .iter()
            .map(|(id, module)| (id.clone(), module.info()))
            .collect();
        self.snapshot.store(Arc::new(snapshot));
    }

    // ─── Loading ─────────────────────────────────────────────────────

    /// Load every unseen archive in `dir`
    ///
    /// Archives already represented by a loaded module are skipped, so the
    /// scan is idempotent. Archives that cannot be opened at all are logged
    /// and skipped; modules that open but fail resolution are admitted as
    /// FAILED. Returns the ids admitted by this call.
    pub fn scan_and_load(&self, dir: &Path) -> Result<Vec<String>, PluginHostError> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if self.loader.is_archive(&path) {
                archives.push(path);
            }
        }
        archives.sort();

        let mut state = self.lock();
        let mut admitted = Vec::new();
        for path in archives {
            if state.holds_path(&path) {
                tracing::debug!(path = %path.display(), "Archive already loaded, skipping");
                continue;
            }
            match self.admit(&mut state, &path) {
                Ok(id) => admitted.push(id),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping archive");
                }
            }
        }
        self.publish(&state);

        Ok(admitted)
    }

    /// Load a single archive and return the admitted module id
    ///
    /// The module ends up RESOLVED, DISABLED (if on the disabled list) or
    /// FAILED with its cause retained.
    pub fn load_archive(&self, path: &Path) -> Result<String, PluginHostError> {
        let mut state = self.lock();
        let id = self.admit(&mut state, path)?;
        self.publish(&state);
        Ok(id)
    }

    /// Run the load and resolve path on an archive without admitting it
    ///
    /// The boundary is released before returning. A module that would end
    /// up FAILED is reported as the error describing its cause.
    pub fn trial_load(&self, path: &Path) -> Result<ModuleDescriptor, PluginHostError> {
        let (boundary, descriptor) = self.open(path)?;
        let resolution = self.resolve(&descriptor);
        drop(boundary);

        match resolution {
            Ok(()) => {
                tracing::debug!(plugin = %descriptor.id, path = %path.display(), "Trial load passed");
                Ok(descriptor)
            }
            Err(cause) => {
                tracing::info!(plugin = %descriptor.id, cause = %cause, "Trial load failed");
                Err(cause.into_error(&descriptor))
            }
        }
    }

    fn open(&self, path: &Path) -> Result<(IsolationBoundary, ModuleDescriptor), PluginHostError> {
        let boundary = self.loader.open(path)?;
        let manifest = boundary
            .manifest()
            .map_err(|reason| PluginHostError::LoadFailure {
                module: path.display().to_string(),
                reason,
            })?;
        let descriptor = ModuleDescriptor::from_manifest(manifest, path.to_path_buf());
        if descriptor.id.is_empty() {
            return Err(PluginHostError::LoadFailure {
                module: path.display().to_string(),
                reason: "Manifest has no id".to_string(),
            });
        }
        Ok((boundary, descriptor))
    }

    /// Check the descriptor's version and host constraint
    fn resolve(&self, descriptor: &ModuleDescriptor) -> Result<(), FailureCause> {
        version::parse_version(&descriptor.version).map_err(cause_from_error)?;

        let Some(host) = self.settings.enforced_host_version() else {
            return Ok(());
        };
        if !descriptor.has_constraint() {
            return Ok(());
        }

        match self.resolver.satisfies(host, &descriptor.requires) {
            Ok(true) => Ok(()),
            Ok(false) => Err(FailureCause::VersionConstraint {
                requires: descriptor.requires.clone(),
                host: host.to_string(),
            }),
            Err(e) => Err(cause_from_error(e)),
        }
    }

    fn admit(&self, state: &mut RegistryState, path: &Path) -> Result<String, PluginHostError> {
        let (boundary, descriptor) = self.open(path)?;

        if let Some(existing) = state.modules.get(&descriptor.id) {
            return Err(PluginHostError::AlreadyLoaded {
                id: descriptor.id,
                path: existing.descriptor.path.clone(),
            });
        }

        let id = descriptor.id.clone();
        let plugin_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.settings.home_dir.clone());
        let context =
            PluginContext::with_services(id.clone(), plugin_dir, Arc::clone(&self.services));

        let mut module = LoadedModule {
            descriptor,
            state: PluginState::Created,
            failure: None,
            context,
            boundary,
        };

        match self.resolve(&module.descriptor) {
            Ok(()) => {
                module.transition(PluginState::Resolved);
                if state.disabled.contains(&id) {
                    module.transition(PluginState::Disabled);
                }
                tracing::info!(
                    plugin = %id,
                    version = %module.descriptor.version,
                    state = %module.state,
                    "Plugin loaded"
                );
            }
            Err(cause) => {
                tracing::error!(plugin = %id, cause = %cause, "Plugin failed to resolve");
                module.failure = Some(cause);
                module.transition(PluginState::Failed);
            }
        }

        state.modules.insert(id.clone(), module);
        Ok(id)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Start a module and return its resulting state
    ///
    /// Modules that are not RESOLVED or STOPPED are left as they are.
    pub fn start(&self, id: &str) -> Result<PluginState, PluginHostError> {
        let mut state = self.lock();
        let module = state
            .modules
            .get_mut(id)
            .ok_or_else(|| PluginHostError::NotFound { id: id.to_string() })?;
        let result = self.start_module(module);
        self.publish(&state);
        Ok(result)
    }

    fn start_module(&self, module: &mut LoadedModule) -> PluginState {
        if !module.state.is_startable() {
            tracing::debug!(plugin = %module.descriptor.id, state = %module.state, "Not startable, skipping");
            return module.state;
        }

        module.transition(PluginState::Started);

        let LoadedModule {
            boundary, context, ..
        } = &mut *module;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            boundary.instance_mut().on_start(context)
        }));
        let pending = module.context.take_pending_extensions();

        let reason = match result {
            Ok(Ok(())) => {
                for registration in pending {
                    self.extensions
                        .register_raw(&module.descriptor.id, registration);
                }
                tracing::info!(plugin = %module.descriptor.id, "Plugin started");
                return module.state;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "Plugin panicked in on_start".to_string(),
        };

        tracing::error!(plugin = %module.descriptor.id, error = %reason, "Plugin failed to start");
        module.failure = Some(FailureCause::Load { reason });
        module.transition(PluginState::Failed);
        module.state
    }

    /// Stop a module and return its resulting state
    ///
    /// Only STARTED modules are affected.
    pub fn stop(&self, id: &str) -> Result<PluginState, PluginHostError> {
        let mut state = self.lock();
        let module = state
            .modules
            .get_mut(id)
            .ok_or_else(|| PluginHostError::NotFound { id: id.to_string() })?;
        let result = self.stop_module(module);
        self.publish(&state);
        Ok(result)
    }

    fn stop_module(&self, module: &mut LoadedModule) -> PluginState {
        if module.state != PluginState::Started {
            tracing::debug!(plugin = %module.descriptor.id, state = %module.state, "Not started, skipping stop");
            return module.state;
        }

        let LoadedModule {
            boundary, context, ..
        } = &mut *module;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            boundary.instance_mut().on_stop(context)
        }));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(plugin = %module.descriptor.id, error = %e, "Plugin on_stop returned error");
            }
            Err(_) => tracing::warn!(plugin = %module.descriptor.id, "Plugin panicked in on_stop"),
        }

        module.context.take_pending_extensions();
        self.extensions.on_unload(&module.descriptor.id);
        module.transition(PluginState::Stopped);
        tracing::info!(plugin = %module.descriptor.id, "Plugin stopped");
        module.state
    }

    /// Return a DISABLED module to RESOLVED
    ///
    /// Returns false for unknown or FAILED modules. The module is not
    /// started.
    pub fn enable(&self, id: &str) -> Result<bool, PluginHostError> {
        let mut state = self.lock();
        let RegistryState { modules, disabled } = &mut *state;
        let Some(module) = modules.get_mut(id) else {
            return Ok(false);
        };

        let enabled = match module.state {
            PluginState::Disabled => {
                module.transition(PluginState::Resolved);
                tracing::info!(plugin = %id, "Plugin enabled");
                true
            }
            PluginState::Failed => false,
            _ => true,
        };

        if enabled && disabled.remove(id) {
            disabled.save(&self.disabled_path())?;
        }
        self.publish(&state);
        Ok(enabled)
    }

    /// Move a module to DISABLED, stopping it first if it is running
    ///
    /// Returns false for unknown or FAILED modules.
    pub fn disable(&self, id: &str) -> Result<bool, PluginHostError> {
        let mut state = self.lock();
        let RegistryState { modules, disabled } = &mut *state;
        let Some(module) = modules.get_mut(id) else {
            return Ok(false);
        };

        if module.state == PluginState::Started {
            self.stop_module(module);
        }

        let result = match module.state {
            PluginState::Resolved | PluginState::Stopped => {
                self.extensions.on_unload(id);
                module.transition(PluginState::Disabled);
                tracing::info!(plugin = %id, "Plugin disabled");
                true
            }
            PluginState::Disabled => true,
            _ => false,
        };

        if result && disabled.insert(id) {
            disabled.save(&self.disabled_path())?;
        }
        self.publish(&state);
        Ok(result)
    }

    /// Unload a module, keeping its archive on disk
    ///
    /// Returns false for unknown ids.
    pub fn unload(&self, id: &str) -> bool {
        let mut state = self.lock();
        let Some(module) = state.modules.remove(id) else {
            return false;
        };
        self.release(module);
        self.publish(&state);
        true
    }

    fn release(&self, mut module: LoadedModule) {
        self.stop_module(&mut module);
        self.extensions.on_unload(&module.descriptor.id);
        module.transition(PluginState::Unloaded);
        tracing::info!(plugin = %module.descriptor.id, "Plugin unloaded");
        // Dropping the module runs on_unload and releases the boundary
    }

    /// Unload a module and remove its archive
    ///
    /// Returns false for unknown ids.
    pub fn delete(&self, id: &str) -> Result<bool, PluginHostError> {
        let mut state = self.lock();
        let Some(module) = state.modules.remove(id) else {
            return Ok(false);
        };
        let path = module.descriptor.path.clone();
        self.release(module);
        self.publish(&state);

        if state.disabled.remove(id) {
            state.disabled.save(&self.disabled_path())?;
        }
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        tracing::info!(plugin = %id, path = %path.display(), "Plugin deleted");
        Ok(true)
    }

    /// Start every RESOLVED or STOPPED module
    ///
    /// A module that fails to start lands in FAILED; the others still start.
    pub fn start_all(&self) {
        let mut state = self.lock();
        for id in state.sorted_ids() {
            if let Some(module) = state.modules.get_mut(&id) {
                self.start_module(module);
            }
        }
        self.publish(&state);
    }

    /// Stop every STARTED module
    pub fn stop_all(&self) {
        let mut state = self.lock();
        for id in state.sorted_ids().into_iter().rev() {
            if let Some(module) = state.modules.get_mut(&id) {
                self.stop_module(module);
            }
        }
        self.publish(&state);
    }

    /// Unload every module
    pub fn unload_all(&self) {
        let mut state = self.lock();
        for id in state.sorted_ids().into_iter().rev() {
            if let Some(module) = state.modules.remove(&id) {
                self.release(module);
            }
        }
        self.publish(&state);
    }

    /// Swap a loaded module for the archive at `new_path`
    ///
    /// The old module is stopped and unloaded, the new archive admitted and
    /// started if the old one was running. If the new archive does not come
    /// up under the same id, it is removed and the old archive re-admitted
    /// in its prior state.
    pub fn replace(&self, id: &str, new_path: &Path) -> Result<ModuleDescriptor, PluginHostError> {
        let mut state = self.lock();
        let old = state
            .modules
            .remove(id)
            .ok_or_else(|| PluginHostError::NotFound { id: id.to_string() })?;
        let old_path = old.descriptor.path.clone();
        let was_started = old.state == PluginState::Started;
        self.release(old);

        let outcome = self.admit_replacement(&mut state, id, new_path, was_started);
        match outcome {
            Ok(descriptor) => {
                if old_path != new_path
                    && let Err(e) = std::fs::remove_file(&old_path)
                {
                    tracing::warn!(path = %old_path.display(), error = %e, "Failed to remove replaced archive");
                }
                self.publish(&state);
                tracing::info!(plugin = %id, version = %descriptor.version, "Plugin replaced");
                Ok(descriptor)
            }
            Err(e) => {
                tracing::error!(plugin = %id, error = %e, "Replacement failed, restoring previous version");
                if old_path != new_path {
                    if let Err(remove) = std::fs::remove_file(new_path) {
                        tracing::warn!(path = %new_path.display(), error = %remove, "Failed to remove rejected archive");
                    }
                    match self.admit(&mut state, &old_path) {
                        Ok(_) if was_started => {
                            if let Some(module) = state.modules.get_mut(id) {
                                self.start_module(module);
                            }
                        }
                        Ok(_) => {}
                        Err(restore) => {
                            tracing::error!(plugin = %id, error = %restore, "Failed to restore previous version");
                        }
                    }
                }
                self.publish(&state);
                Err(e)
            }
        }
    }

    fn admit_replacement(
        &self,
        state: &mut RegistryState,
        id: &str,
        new_path: &Path,
        start: bool,
    ) -> Result<ModuleDescriptor, PluginHostError> {
        let new_id = self.admit(state, new_path)?;
        let Some(module) = state.modules.get_mut(&new_id) else {
            return Err(PluginHostError::NotFound { id: new_id });
        };

        let mismatch = (new_id != id).then(|| {
            PluginHostError::update_failure(id, format!("archive contains module '{new_id}'"))
        });
        let failure = module
            .failure
            .clone()
            .map(|cause| cause.into_error(&module.descriptor));
        if let Some(error) = mismatch.or(failure) {
            if let Some(module) = state.modules.remove(&new_id) {
                self.release(module);
            }
            return Err(error);
        }

        if start && self.start_module(module) == PluginState::Failed {
            let error = module
                .failure
                .clone()
                .map(|cause| cause.into_error(&module.descriptor))
                .unwrap_or_else(|| PluginHostError::update_failure(id, "failed to start"));
            if let Some(module) = state.modules.remove(&new_id) {
                self.release(module);
            }
            return Err(error);
        }

        Ok(module.descriptor.clone())
    }

    fn disabled_path(&self) -> PathBuf {
        self.settings.home_dir.join(DISABLED_FILE)
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// Snapshot of one module
    pub fn plugin(&self, id: &str) -> Option<PluginInfo> {
        self.snapshot.load().get(id).cloned()
    }

    /// Snapshot of every loaded module, ordered by id
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.snapshot.load().values().cloned().collect()
    }

    /// Ids of the modules on the persisted disabled list
    pub fn disabled_ids(&self) -> Vec<String> {
        self.lock().disabled.disabled.iter().cloned().collect()
    }

    /// Instances of capability `C` registered by started modules
    pub fn get_extensions<C: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<C>> {
        self.extensions.lookup::<C>()
    }

    /// Instances of capability `C` registered by one module
    pub fn get_extensions_for<C: ?Sized + Send + Sync + 'static>(&self, owner: &str) -> Vec<Arc<C>> {
        self.extensions.lookup_owned::<C>(owner)
    }

    /// Copy a module's archive into `sink`, returning the bytes written
    pub fn export_archive(&self, id: &str, sink: &mut dyn Write) -> Result<u64, PluginHostError> {
        let info = self
            .plugin(id)
            .ok_or_else(|| PluginHostError::NotFound { id: id.to_string() })?;
        let mut file = std::fs::File::open(&info.descriptor.path)?;
        Ok(std::io::copy(&mut file, sink)?)
    }

    /// Whether the running host is too old for the module's constraint
    pub fn is_outdated(&self, descriptor: &ModuleDescriptor) -> Result<bool, PluginHostError> {
        match self.settings.enforced_host_version() {
            Some(host) if descriptor.has_constraint() => {
                Ok(!self.resolver.satisfies(host, &descriptor.requires)?)
            }
            _ => Ok(false),
        }
    }
}

fn cause_from_error(error: PluginHostError) -> FailureCause {
    match error {
        PluginHostError::MalformedVersionExpression { expression, reason } => {
            FailureCause::MalformedVersion { expression, reason }
        }
        other => FailureCause::Load {
            reason: other.to_string(),
        },
    }
}
