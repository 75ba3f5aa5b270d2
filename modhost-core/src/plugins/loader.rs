//! Isolation boundaries and the loaders that create them

use std::panic::AssertUnwindSafe;
use std::path::Path;

use libloading::Library;
use modhost_plugin_api::{API_VERSION, Plugin, PluginManifest};

use crate::error::PluginHostError;

/// Everything that keeps one module's code alive
///
/// Owns the module instance and, for native modules, the library it was
/// created from. Dropping the boundary runs `on_unload` and then releases
/// the library; the instance always goes first.
pub struct IsolationBoundary {
    /// The plugin instance
    instance: Box<dyn Plugin>,
    /// Keep the library loaded
    _library: Option<Library>,
}

impl IsolationBoundary {
    /// Boundary for an instance that lives in the host's own code
    pub fn in_process(instance: Box<dyn Plugin>) -> Self {
        Self {
            instance,
            _library: None,
        }
    }

    /// Boundary for an instance created from a dynamic library
    pub fn from_library(instance: Box<dyn Plugin>, library: Library) -> Self {
        Self {
            instance,
            _library: Some(library),
        }
    }

    /// Read the module's manifest, treating a panic as a load failure
    pub fn manifest(&self) -> Result<PluginManifest, String> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.instance.manifest()))
            .map_err(|_| "Plugin panicked while reporting its manifest".to_string())
    }

    /// The module instance, for invoking hooks
    pub fn instance_mut(&mut self) -> &mut dyn Plugin {
        self.instance.as_mut()
    }
}

impl Drop for IsolationBoundary {
    fn drop(&mut self) {
        // Give the module a chance to release resources that reference
        // types defined in its library before the library goes away.
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.instance.on_unload()));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Plugin on_unload returned error"),
            Err(_) => tracing::warn!("Plugin panicked in on_unload"),
        }
    }
}

/// Creates isolation boundaries from archive files
pub trait ModuleLoader: Send + Sync {
    /// Whether the file looks like a module archive this loader handles
    fn is_archive(&self, path: &Path) -> bool;

    /// Open the archive and instantiate the module it contains
    fn open(&self, path: &Path) -> Result<IsolationBoundary, PluginHostError>;
}

/// Loads modules from native dynamic libraries (`.so`, `.dylib`, `.dll`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl DylibLoader {
    /// File extensions recognized on this platform
    pub fn extensions() -> &'static [&'static str] {
        if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else if cfg!(target_os = "windows") {
            &["dll"]
        } else {
            &["so"]
        }
    }
}

impl ModuleLoader for DylibLoader {
    fn is_archive(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| Self::extensions().contains(&ext))
    }

    fn open(&self, path: &Path) -> Result<IsolationBoundary, PluginHostError> {
        // SAFETY: Archives only reach the home directory after passing a
        // trial load, and modules are expected to follow the Plugin contract.
        let library = unsafe { Library::new(path)? };

        // SAFETY: We're calling a C function exported by the module.
        let api_version_fn: libloading::Symbol<extern "C" fn() -> u32> =
            unsafe { library.get(b"_modhost_plugin_api_version")? };

        let found = api_version_fn();
        if found != API_VERSION {
            return Err(PluginHostError::ApiVersionMismatch {
                expected: API_VERSION,
                found,
            });
        }

        // SAFETY: The create function returns a pointer produced by
        // Box::into_raw in export_plugin!, which we convert back.
        let create_fn: libloading::Symbol<extern "C" fn() -> *mut dyn Plugin> =
            unsafe { library.get(b"_modhost_plugin_create")? };

        let raw = std::panic::catch_unwind(AssertUnwindSafe(|| create_fn())).map_err(|_| {
            PluginHostError::LoadFailure {
                module: path.display().to_string(),
                reason: "Plugin panicked while being created".to_string(),
            }
        })?;
        if raw.is_null() {
            return Err(PluginHostError::LoadFailure {
                module: path.display().to_string(),
                reason: "Plugin create function returned null".to_string(),
            });
        }
        let instance = unsafe { Box::from_raw(raw) };

        Ok(IsolationBoundary::from_library(instance, library))
    }
}
