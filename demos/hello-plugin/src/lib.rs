//! Hello Plugin - A simple example module for modhost
//!
//! This module demonstrates:
//! - Basic module structure with the `export_plugin!` macro
//! - Declaring a host-version constraint in the manifest
//! - Reading and writing module-scoped configuration
//! - Registering a [`SettingsPanel`] extension during `on_start`
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! modhost plugin install target/release/libhello_plugin.so
//! modhost plugin settings hello --set username=ada
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use modhost_plugin_api::{
    HostServices, Plugin, PluginContext, PluginError, PluginManifest, SettingField, SettingsPanel,
    export_plugin,
};

const ID: &str = "hello";

/// Greets the configured user each time it starts.
#[derive(Default)]
pub struct HelloPlugin {
    starts: u32,
}

impl Plugin for HelloPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            id: ID.to_string(),
            version: "0.1.0".to_string(),
            requires: ">=0.1.0".to_string(),
            description: "Greets the configured user on start".to_string(),
            provider: "modhost".to_string(),
            license: "MIT".to_string(),
            ..Default::default()
        }
    }

    fn on_start(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        self.starts += 1;
        let username = ctx.config_get("username", "world");
        ctx.log_info(&format!(
            "Hello, {username}! (host {}, start #{})",
            ctx.host_version(),
            self.starts
        ));
        if ctx.config_get("debug", "false") == "true" {
            ctx.log_debug(&format!("Archive directory: {}", ctx.plugin_dir().display()));
        }

        ctx.register_extension::<dyn SettingsPanel>(Arc::new(HelloSettings {
            services: ctx.services(),
        }));
        Ok(())
    }

    fn on_stop(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        ctx.log_info("Goodbye!");
        Ok(())
    }
}

/// Editable `username` and `debug` settings
struct HelloSettings {
    services: Arc<dyn HostServices>,
}

impl HelloSettings {
    const FIELDS: [(&'static str, &'static str, &'static str); 2] = [
        ("username", "Name to greet", "world"),
        ("debug", "Log extra detail", "false"),
    ];

    fn key(name: &str) -> String {
        format!("{ID}.{name}")
    }
}

impl SettingsPanel for HelloSettings {
    fn fields(&self) -> Vec<SettingField> {
        Self::FIELDS
            .iter()
            .map(|(name, label, default)| SettingField {
                name: name.to_string(),
                label: label.to_string(),
                value: self
                    .services
                    .config_value(&Self::key(name))
                    .unwrap_or_else(|| default.to_string()),
            })
            .collect()
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<(), PluginError> {
        for (name, value) in values {
            if !Self::FIELDS.iter().any(|(known, _, _)| *known == name.as_str()) {
                return Err(PluginError::invalid_input(format!("unknown setting: {name}")));
            }
            if name == "debug" && value != "true" && value != "false" {
                return Err(PluginError::invalid_input("debug must be true or false"));
            }
            self.services.set_config_value(&Self::key(name), value)?;
        }
        Ok(())
    }
}

// This macro generates the C ABI entry points for dynamic loading
export_plugin!(HelloPlugin);
