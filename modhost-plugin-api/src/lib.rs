//! modhost-plugin-api - the contract between the modhost host and its modules
//!
//! A module is a native Rust dynamic library that describes itself with a
//! [`PluginManifest`] and implements start/stop hooks. During `on_start` it
//! receives a [`PluginContext`] carrying the host's injected services and may
//! register extension instances for host-defined capabilities (for example a
//! [`SettingsPanel`]).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use modhost_plugin_api::{Plugin, PluginContext, PluginError, PluginManifest, export_plugin};
//!
//! #[derive(Default)]
//! pub struct MyPlugin;
//!
//! impl Plugin for MyPlugin {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest {
//!             id: "my-plugin".to_string(),
//!             version: "0.1.0".to_string(),
//!             requires: ">=0.1.0".to_string(),
//!             ..Default::default()
//!         }
//!     }
//!
//!     fn on_start(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
//!         ctx.log_info("Plugin started!");
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(MyPlugin);
//! ```

pub mod context;
pub mod error;
pub mod extension;
pub mod types;

pub use context::{ExtensionRegistration, HostServices, PluginContext, StaticServices};
pub use error::PluginError;
pub use extension::{SettingField, SettingsPanel};
pub use types::*;

/// Current plugin API version. Modules must match this exactly.
/// The host checks it before instantiating a module from a library.
pub const API_VERSION: u32 = 1;

/// The core plugin trait - implement this to create a modhost module.
///
/// Only `manifest` and `on_start` are required; the remaining hooks default
/// to no-ops.
pub trait Plugin: Send + Sync {
    /// Return module metadata
    fn manifest(&self) -> PluginManifest;

    /// Called when the module is started. Register extensions here.
    fn on_start(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError>;

    /// Called when the module is stopped. Extensions registered by the
    /// module are withdrawn by the host right after this returns.
    fn on_stop(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called right before the module's library is released.
    fn on_unload(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Export a plugin type for dynamic loading.
///
/// This macro generates the C ABI entry points that modhost uses to load
/// and unload modules dynamically.
///
/// # Usage
///
/// ```ignore
/// modhost_plugin_api::export_plugin!(MyPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_modhost_plugin_create()`: Creates a new plugin instance
/// - `_modhost_plugin_api_version()`: Returns the API version
/// - `_modhost_plugin_destroy()`: Destroys a plugin instance
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _modhost_plugin_create() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new(<$plugin_type>::default());
            Box::into_raw(plugin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _modhost_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _modhost_plugin_destroy(ptr: *mut dyn $crate::Plugin) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Minimal;

    impl Plugin for Minimal {
        fn manifest(&self) -> PluginManifest {
            PluginManifest {
                id: "minimal".to_string(),
                ..Default::default()
            }
        }

        fn on_start(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn test_api_version_is_set() {
        assert_eq!(API_VERSION, 1);
    }

    #[test]
    fn test_plugin_trait_is_object_safe() {
        fn _takes_boxed_plugin(_: Box<dyn Plugin>) {}
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let mut plugin = Minimal;
        let mut ctx = PluginContext::new("minimal".into(), std::path::PathBuf::from("/tmp"));
        assert!(plugin.on_start(&mut ctx).is_ok());
        assert!(plugin.on_stop(&mut ctx).is_ok());
        assert!(plugin.on_unload().is_ok());
    }

    #[test]
    fn test_manifest_default_has_correct_api_version() {
        let manifest = PluginManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
    }
}
