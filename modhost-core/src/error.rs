//! Error types for modhost-core

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the plugin host
#[derive(Error, Debug)]
pub enum PluginHostError {
    /// Archive could not be turned into a module, or a hook failed
    #[error("Failed to load module {module}: {reason}")]
    LoadFailure { module: String, reason: String },

    /// API version mismatch between modhost and the module
    #[error("API version mismatch: modhost expects {expected}, module has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// Failed to load dynamic library
    #[error("Failed to load plugin library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// The running host does not satisfy the module's required host version
    #[error("Plugin '{id}@{version}' requires host version {requires}, and the host is {host}")]
    VersionConstraintViolation {
        id: String,
        version: String,
        requires: String,
        host: String,
    },

    /// A version or constraint string could not be parsed
    #[error("Malformed version expression '{expression}': {reason}")]
    MalformedVersionExpression { expression: String, reason: String },

    /// Filesystem error while writing or moving an uploaded archive
    #[error("Staging failed for {path}: {source}")]
    StagingFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Download or apply step of an update failed
    #[error("Update of '{id}' failed: {reason}")]
    UpdateFailure { id: String, reason: String },

    /// Plugin not found
    #[error("Plugin '{id}' not found")]
    NotFound { id: String },

    /// A module with the same id is already loaded
    #[error("Plugin '{id}' is already loaded from {path}")]
    AlreadyLoaded { id: String, path: PathBuf },

    /// The permission collaborator refused the action
    #[error("Permission denied: {action}")]
    PermissionDenied { action: String },

    /// Persisted record could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A spawned background task panicked or was cancelled
    #[error("Background task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    /// HTTP error while talking to a repository
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginHostError {
    /// Shorthand for a [`PluginHostError::MalformedVersionExpression`]
    pub fn malformed(expression: &str, reason: impl ToString) -> Self {
        Self::MalformedVersionExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`PluginHostError::UpdateFailure`]
    pub fn update_failure(id: &str, reason: impl ToString) -> Self {
        Self::UpdateFailure {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_mismatch_display() {
        let err = PluginHostError::ApiVersionMismatch {
            expected: 1,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("1"));
        assert!(msg.contains("2"));
    }

    #[test]
    fn test_version_constraint_violation_display() {
        let err = PluginHostError::VersionConstraintViolation {
            id: "welcome".into(),
            version: "2.0.0".into(),
            requires: ">=3.0.0".into(),
            host: "1.0.0".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("welcome@2.0.0"));
        assert!(msg.contains(">=3.0.0"));
        assert!(msg.contains("1.0.0"));
    }

    #[test]
    fn test_not_found_display() {
        let err = PluginHostError::NotFound {
            id: "test-plugin".to_string(),
        };
        assert!(err.to_string().contains("test-plugin"));
    }

    #[test]
    fn test_staging_failure_keeps_source() {
        let err = PluginHostError::StagingFailure {
            path: PathBuf::from("/tmp/a.so"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/tmp/a.so"));
    }

    #[test]
    fn test_task_failed_display() {
        let err = PluginHostError::TaskFailed {
            task: "reload".into(),
            reason: "task panicked".into(),
        };
        assert_eq!(err.to_string(), "Background task 'reload' failed: task panicked");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PluginHostError = io_err.into();
        assert!(matches!(err, PluginHostError::Io(_)));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            PluginHostError::malformed("1.x.y", "bad"),
            PluginHostError::MalformedVersionExpression { .. }
        ));
        assert!(matches!(
            PluginHostError::update_failure("a", "offline"),
            PluginHostError::UpdateFailure { .. }
        ));
    }
}
