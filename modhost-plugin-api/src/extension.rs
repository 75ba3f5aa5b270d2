//! Host-defined capabilities that modules may implement

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// One editable setting exposed by a [`SettingsPanel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingField {
    /// Setting name, scoped under the module id by the panel
    pub name: String,
    /// Label shown to the operator
    pub label: String,
    /// Current value (string form)
    pub value: String,
}

/// Settings page contributed by a module.
///
/// A module registers at most one panel during `on_start`; the host looks it
/// up by owner id to render and save the module's settings.
pub trait SettingsPanel: Send + Sync {
    /// Current fields with their values
    fn fields(&self) -> Vec<SettingField>;

    /// Persist edited values, keyed by field name
    fn save(&self, values: &HashMap<String, String>) -> Result<(), PluginError>;
}
