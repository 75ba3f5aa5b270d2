//! PluginContext - a module's interface to host services

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::PluginError;

// ─── Host Services ───────────────────────────────────────────────────

/// Services the host hands to a module when it starts.
///
/// Modules reach host functionality only through this handle; there is no
/// process-wide accessor. The concrete implementation lives in the host.
pub trait HostServices: Send + Sync {
    /// Version of the running host
    fn host_version(&self) -> String;

    /// Read a raw config value by its fully qualified key
    fn config_value(&self, key: &str) -> Option<String>;

    /// Create or overwrite a config value by its fully qualified key
    fn set_config_value(&self, key: &str, value: &str) -> Result<(), PluginError>;
}

/// In-memory [`HostServices`] used when no host is attached (tests, tooling).
#[derive(Debug, Default)]
pub struct StaticServices {
    host_version: String,
    values: Mutex<HashMap<String, String>>,
}

impl StaticServices {
    /// Create services reporting the given host version
    pub fn new(host_version: impl Into<String>) -> Self {
        Self {
            host_version: host_version.into(),
            values: Mutex::new(HashMap::new()),
        }
    }
}

impl HostServices for StaticServices {
    fn host_version(&self) -> String {
        self.host_version.clone()
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_config_value(&self, key: &str, value: &str) -> Result<(), PluginError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ─── Extension Registration ──────────────────────────────────────────

/// An extension instance a module offers for a host-defined capability.
///
/// The instance is stored type-erased; the host recovers it with
/// [`ExtensionRegistration::downcast`] using the same capability type.
#[derive(Clone)]
pub struct ExtensionRegistration {
    capability: TypeId,
    capability_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ExtensionRegistration {
    /// Wrap an instance implementing capability `C`
    pub fn new<C: ?Sized + Send + Sync + 'static>(instance: Arc<C>) -> Self {
        Self {
            capability: TypeId::of::<C>(),
            capability_name: std::any::type_name::<C>(),
            instance: Arc::new(instance),
        }
    }

    /// Type id of the capability this instance was registered for
    pub fn capability(&self) -> TypeId {
        self.capability
    }

    /// Readable capability name (for logs)
    pub fn capability_name(&self) -> &'static str {
        self.capability_name
    }

    /// Recover the instance as capability `C`
    pub fn downcast<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.instance.downcast_ref::<Arc<C>>().cloned()
    }
}

impl std::fmt::Debug for ExtensionRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistration")
            .field("capability", &self.capability_name)
            .finish_non_exhaustive()
    }
}

// ─── Context ─────────────────────────────────────────────────────────

/// A module's interface to the host.
///
/// Passed to the start and stop hooks. Provides:
/// - the injected [`HostServices`] handle
/// - module-scoped configuration (`"<module-id>.<name>"` keys)
/// - extension registration, committed by the host once `on_start` succeeds
/// - logging helpers tagged with the module id
pub struct PluginContext {
    plugin_id: String,
    plugin_dir: PathBuf,
    services: Arc<dyn HostServices>,
    /// Extensions pending registration
    pending_extensions: Vec<ExtensionRegistration>,
}

impl PluginContext {
    /// Create a context backed by detached in-memory services
    pub fn new(plugin_id: String, plugin_dir: PathBuf) -> Self {
        Self::with_services(plugin_id, plugin_dir, Arc::new(StaticServices::default()))
    }

    /// Create a context with host-provided services
    pub fn with_services(
        plugin_id: String,
        plugin_dir: PathBuf,
        services: Arc<dyn HostServices>,
    ) -> Self {
        Self {
            plugin_id,
            plugin_dir,
            services,
            pending_extensions: Vec::new(),
        }
    }

    /// Get the module's id
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Get the directory holding the module's archive
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Get the injected host services
    pub fn services(&self) -> Arc<dyn HostServices> {
        Arc::clone(&self.services)
    }

    /// Version of the running host
    pub fn host_version(&self) -> String {
        self.services.host_version()
    }

    // ─── Configuration ───────────────────────────────────────────────

    fn scoped_key(&self, name: &str) -> String {
        format!("{}.{}", self.plugin_id, name)
    }

    /// Read a module-scoped config value, falling back to `default`
    ///
    /// # Example
    /// ```ignore
    /// let greeting = ctx.config_get("greeting", "hello");
    /// ```
    pub fn config_get(&self, name: &str, default: &str) -> String {
        self.services
            .config_value(&self.scoped_key(name))
            .unwrap_or_else(|| default.to_string())
    }

    /// Write a module-scoped config value (stored in its string form)
    pub fn config_set(&self, name: &str, value: impl Display) -> Result<(), PluginError> {
        self.services
            .set_config_value(&self.scoped_key(name), &value.to_string())
    }

    // ─── Extension Registration ──────────────────────────────────────

    /// Register an instance for capability `C`.
    ///
    /// ```ignore
    /// ctx.register_extension::<dyn SettingsPanel>(Arc::new(MyPanel::default()));
    /// ```
    pub fn register_extension<C: ?Sized + Send + Sync + 'static>(&mut self, instance: Arc<C>) {
        let registration = ExtensionRegistration::new(instance);
        tracing::debug!(
            plugin = %self.plugin_id,
            capability = registration.capability_name(),
            "Extension registered"
        );
        self.pending_extensions.push(registration);
    }

    /// Get extensions pending registration (used by the host)
    pub fn pending_extensions(&self) -> &[ExtensionRegistration] {
        &self.pending_extensions
    }

    /// Take pending extensions (used by the host after `on_start` succeeds)
    pub fn take_pending_extensions(&mut self) -> Vec<ExtensionRegistration> {
        std::mem::take(&mut self.pending_extensions)
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message (automatically tagged with the module id)
    pub fn log_info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin_id, "{}", message);
    }

    /// Log a warning message
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin_id, "{}", message);
    }

    /// Log an error message
    pub fn log_error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin_id, "{}", message);
    }

    /// Log a debug message
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin_id, "{}", message);
    }
}
