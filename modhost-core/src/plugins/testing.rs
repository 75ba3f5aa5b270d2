//! Scripted modules for unit tests
//!
//! An archive is a `<name>.module.toml` file holding a manifest plus flags
//! that decide how the module's hooks behave.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use modhost_plugin_api::{Plugin, PluginContext, PluginError, PluginManifest};
use serde::Deserialize;

use super::loader::{IsolationBoundary, ModuleLoader};
use crate::error::PluginHostError;

pub(crate) const ARCHIVE_SUFFIX: &str = ".module.toml";

#[derive(Debug, Clone, Deserialize)]
struct Script {
    id: String,
    version: String,
    #[serde(default)]
    requires: String,
    #[serde(default)]
    fail_start: bool,
    #[serde(default)]
    panic_start: bool,
}

struct ScriptedPlugin {
    script: Script,
}

impl Plugin for ScriptedPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            id: self.script.id.clone(),
            version: self.script.version.clone(),
            requires: self.script.requires.clone(),
            ..Default::default()
        }
    }

    fn on_start(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        if self.script.panic_start {
            panic!("scripted panic");
        }
        if self.script.fail_start {
            return Err(PluginError::custom("scripted failure"));
        }
        ctx.register_extension::<String>(Arc::new(format!("hello from {}", self.script.id)));
        Ok(())
    }
}

/// Loader for `.module.toml` scripts
pub(crate) struct ScriptedLoader;

impl ModuleLoader for ScriptedLoader {
    fn is_archive(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ARCHIVE_SUFFIX))
    }

    fn open(&self, path: &Path) -> Result<IsolationBoundary, PluginHostError> {
        let content = std::fs::read_to_string(path)?;
        let script: Script = toml::from_str(&content).map_err(|e| PluginHostError::LoadFailure {
            module: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(IsolationBoundary::in_process(Box::new(ScriptedPlugin {
            script,
        })))
    }
}

/// Script text for a module
pub(crate) fn script(id: &str, version: &str, requires: &str, extra: &str) -> String {
    format!("id = \"{id}\"\nversion = \"{version}\"\nrequires = \"{requires}\"\n{extra}\n")
}

/// Write `<id>-<version>.module.toml` into `dir`
pub(crate) fn write_archive(
    dir: &Path,
    id: &str,
    version: &str,
    requires: &str,
    extra: &str,
) -> PathBuf {
    let path = dir.join(format!("{id}-{version}{ARCHIVE_SUFFIX}"));
    std::fs::write(&path, script(id, version, requires, extra)).unwrap();
    path
}
