//! Module descriptors, lifecycle states and failure causes

use std::fmt;
use std::path::PathBuf;

use modhost_plugin_api::PluginManifest;
use serde::Serialize;

use crate::error::PluginHostError;

/// Static metadata of a loaded module
///
/// Built from the module's manifest plus the archive it was loaded from.
/// Immutable while the module is loaded; an update replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDescriptor {
    pub id: String,
    pub version: String,
    /// Required host version constraint (`""`/`"*"` = unconstrained)
    pub requires: String,
    pub description: String,
    pub license: String,
    pub provider: String,
    /// Owning archive on disk
    pub path: PathBuf,
}

impl ModuleDescriptor {
    /// Combine a manifest with the archive location it came from
    pub fn from_manifest(manifest: PluginManifest, path: PathBuf) -> Self {
        Self {
            id: manifest.id.trim().to_string(),
            version: manifest.version.trim().to_string(),
            requires: manifest.requires.trim().to_string(),
            description: manifest.description,
            license: manifest.license,
            provider: manifest.provider,
            path,
        }
    }

    /// Whether a host-version constraint is declared
    pub fn has_constraint(&self) -> bool {
        !crate::version::is_unconstrained(&self.requires)
    }
}

/// Lifecycle state of a module
///
/// ```text
/// CREATED ─▶ RESOLVED ─▶ STARTED ─▶ STOPPED ─▶ STARTED
///    │          │           │          │
///    ▼          ▼           ▼          ▼
///  FAILED    DISABLED     FAILED    DISABLED ─▶ RESOLVED
///
/// any state except UNLOADED ─▶ UNLOADED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginState {
    Created,
    Resolved,
    Started,
    Stopped,
    Disabled,
    Failed,
    Unloaded,
}

impl PluginState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        match (self, next) {
            (Unloaded, _) => false,
            (_, Unloaded) => true,
            (Created, Resolved | Failed)
            | (Resolved, Started | Disabled)
            | (Started, Stopped | Failed)
            | (Stopped, Started | Disabled)
            | (Disabled, Resolved) => true,
            _ => false,
        }
    }

    /// States from which `start` runs the start hook
    pub fn is_startable(self) -> bool {
        matches!(self, PluginState::Resolved | PluginState::Stopped)
    }

    /// Upper-case name, e.g. `STARTED`
    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::Created => "CREATED",
            PluginState::Resolved => "RESOLVED",
            PluginState::Started => "STARTED",
            PluginState::Stopped => "STOPPED",
            PluginState::Disabled => "DISABLED",
            PluginState::Failed => "FAILED",
            PluginState::Unloaded => "UNLOADED",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a module ended up FAILED; retained and queryable
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// Manifest was invalid, or a hook returned an error or panicked
    Load { reason: String },
    /// The running host does not satisfy `requires`
    VersionConstraint { requires: String, host: String },
    /// The module's version or constraint could not be parsed
    MalformedVersion { expression: String, reason: String },
}

impl FailureCause {
    /// Turn the cause into the error reported to a caller, unchanged in substance
    pub fn into_error(self, descriptor: &ModuleDescriptor) -> PluginHostError {
        match self {
            FailureCause::Load { reason } => PluginHostError::LoadFailure {
                module: descriptor.id.clone(),
                reason,
            },
            FailureCause::VersionConstraint { requires, host } => {
                PluginHostError::VersionConstraintViolation {
                    id: descriptor.id.clone(),
                    version: descriptor.version.clone(),
                    requires,
                    host,
                }
            }
            FailureCause::MalformedVersion { expression, reason } => {
                PluginHostError::MalformedVersionExpression { expression, reason }
            }
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Load { reason } => write!(f, "{reason}"),
            FailureCause::VersionConstraint { requires, host } => {
                write!(f, "requires host version {requires}, host is {host}")
            }
            FailureCause::MalformedVersion { expression, reason } => {
                write!(f, "malformed version expression '{expression}': {reason}")
            }
        }
    }
}

/// Snapshot of one module as seen by readers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub descriptor: ModuleDescriptor,
    pub state: PluginState,
    pub failure: Option<FailureCause>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use PluginState::*;

    const ALL: [PluginState; 7] = [
        Created, Resolved, Started, Stopped, Disabled, Failed, Unloaded,
    ];

    #[test]
    fn test_allowed_transitions() {
        let allowed = [
            (Created, Resolved),
            (Created, Failed),
            (Resolved, Started),
            (Resolved, Disabled),
            (Started, Stopped),
            (Started, Failed),
            (Stopped, Started),
            (Stopped, Disabled),
            (Disabled, Resolved),
        ];
        for (from, to) in allowed {
            assert!(from.can_transition_to(to), "{from} -> {to} should be allowed");
        }
    }

    #[test]
    fn test_everything_but_unloaded_can_unload() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Unloaded), state != Unloaded);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        let rejected = [
            (Resolved, Stopped),
            (Created, Started),
            (Disabled, Started),
            (Failed, Started),
            (Failed, Resolved),
            (Started, Disabled),
            (Unloaded, Resolved),
        ];
        for (from, to) in rejected {
            assert!(!from.can_transition_to(to), "{from} -> {to} should be rejected");
        }
    }

    #[test]
    fn test_state_display_is_upper_case() {
        assert_eq!(Started.to_string(), "STARTED");
        assert_eq!(serde_json::to_string(&Disabled).unwrap(), "\"DISABLED\"");
    }

    #[test]
    fn test_descriptor_from_manifest_trims() {
        let manifest = PluginManifest {
            id: " welcome ".into(),
            version: "1.0.0".into(),
            requires: " * ".into(),
            ..Default::default()
        };
        let descriptor = ModuleDescriptor::from_manifest(manifest, PathBuf::from("a.so"));
        assert_eq!(descriptor.id, "welcome");
        assert!(!descriptor.has_constraint());
    }

    #[test]
    fn test_cause_into_error() {
        let descriptor = ModuleDescriptor::from_manifest(
            PluginManifest {
                id: "a".into(),
                version: "2.0.0".into(),
                ..Default::default()
            },
            PathBuf::from("a.so"),
        );
        let err = FailureCause::VersionConstraint {
            requires: ">=9.0.0".into(),
            host: "1.0.0".into(),
        }
        .into_error(&descriptor);
        assert!(matches!(
            err,
            PluginHostError::VersionConstraintViolation { ref id, .. } if id == "a"
        ));
    }
}
