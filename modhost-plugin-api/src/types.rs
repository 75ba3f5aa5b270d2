//! Plugin types and metadata structures

use serde::{Deserialize, Serialize};

/// Plugin manifest containing metadata about the module
///
/// The host combines this with the archive location to form the module's
/// descriptor. It is immutable for as long as the module stays loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique, stable module id
    pub id: String,
    /// Module version (semantic-ish, e.g. `1.2.0`)
    pub version: String,
    /// Required host version constraint; empty or `*` means unconstrained
    #[serde(default)]
    pub requires: String,
    /// API version this module was built against
    pub api_version: u32,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// License name
    #[serde(default)]
    pub license: String,
    /// Module provider / author
    #[serde(default)]
    pub provider: String,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            id: String::new(),
            version: "0.0.1".to_string(),
            requires: String::new(),
            api_version: crate::API_VERSION,
            description: String::new(),
            license: String::new(),
            provider: String::new(),
        }
    }
}

impl PluginManifest {
    /// Whether the manifest declares a host-version constraint at all
    pub fn has_constraint(&self) -> bool {
        let requires = self.requires.trim();
        !requires.is_empty() && requires != "*"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_default_api_version() {
        let manifest = PluginManifest::default();
        assert_eq!(manifest.api_version, crate::API_VERSION);
        assert!(!manifest.has_constraint());
    }

    #[test]
    fn test_manifest_toml_parsing_with_missing_optionals() {
        let manifest: PluginManifest = toml::from_str(
            r#"
id = "welcome"
version = "1.0.0"
api_version = 1
"#,
        )
        .expect("Failed to parse");

        assert_eq!(manifest.id, "welcome");
        assert!(manifest.requires.is_empty());
        assert!(manifest.provider.is_empty());
    }

    #[test]
    fn test_has_constraint() {
        let mut manifest = PluginManifest::default();
        manifest.requires = "*".to_string();
        assert!(!manifest.has_constraint());

        manifest.requires = " >=1.0.0 ".to_string();
        assert!(manifest.has_constraint());
    }
}
