//! Staged installation of module archives
//!
//! An archive is written to the temp area under a unique name, trial-loaded
//! through the registry and only then moved into the home directory. The
//! home directory never receives an archive that failed its trial.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::registry::PluginRegistry;
use super::state::ModuleDescriptor;
use crate::error::PluginHostError;

/// An archive that passed its trial load and waits in the temp area
#[derive(Debug, Clone)]
pub struct StagedArchive {
    /// Unique file in the temp area
    pub temp_path: PathBuf,
    /// Name the archive gets in the home directory
    pub file_name: String,
    /// Descriptor read during the trial load
    pub descriptor: ModuleDescriptor,
}

/// Writes, validates and commits uploaded archives
pub struct StagingInstaller {
    registry: Arc<PluginRegistry>,
    home_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl StagingInstaller {
    /// Create an installer over the registry's home and temp directories
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        let home_dir = registry.settings().home_dir.clone();
        let tmp_dir = registry.settings().tmp_dir.clone();
        Self {
            registry,
            home_dir,
            tmp_dir,
        }
    }

    /// Registry modules are admitted into
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Write `bytes` to the temp area and trial-load them
    ///
    /// On failure the temp file is removed and the trial's error returned
    /// unchanged.
    pub fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<StagedArchive, PluginHostError> {
        let file_name = validate_file_name(file_name)?;

        std::fs::create_dir_all(&self.tmp_dir).map_err(|source| {
            PluginHostError::StagingFailure {
                path: self.tmp_dir.clone(),
                source,
            }
        })?;

        let temp_path = self.tmp_dir.join(format!("{}-{}", Uuid::new_v4(), file_name));
        if let Err(source) = std::fs::write(&temp_path, bytes) {
            remove_quietly(&temp_path);
            return Err(PluginHostError::StagingFailure {
                path: temp_path,
                source,
            });
        }
        tracing::debug!(path = %temp_path.display(), size = bytes.len(), "Archive written to temp area");

        let trial = if self.registry.loader().is_archive(&temp_path) {
            self.registry.trial_load(&temp_path)
        } else {
            Err(PluginHostError::LoadFailure {
                module: file_name.to_string(),
                reason: "Not a module archive".to_string(),
            })
        };

        match trial {
            Ok(descriptor) => Ok(StagedArchive {
                temp_path,
                file_name: file_name.to_string(),
                descriptor,
            }),
            Err(e) => {
                remove_quietly(&temp_path);
                Err(e)
            }
        }
    }

    /// Move a staged archive into the home directory, replacing any file
    /// with the same name
    pub fn commit(&self, staged: StagedArchive) -> Result<PathBuf, PluginHostError> {
        let target = self.home_dir.join(&staged.file_name);
        let staging_failure = |source: io::Error| PluginHostError::StagingFailure {
            path: target.clone(),
            source,
        };

        if let Err(e) = std::fs::create_dir_all(&self.home_dir) {
            remove_quietly(&staged.temp_path);
            return Err(staging_failure(e));
        }

        if std::fs::rename(&staged.temp_path, &target).is_err() {
            // Temp and home may live on different filesystems; copy next to
            // the target and rename so the target never holds a partial file.
            let partial = self.home_dir.join(format!(".{}.partial", staged.file_name));
            let copied = std::fs::copy(&staged.temp_path, &partial)
                .and_then(|_| std::fs::rename(&partial, &target));
            remove_quietly(&staged.temp_path);
            if let Err(e) = copied {
                remove_quietly(&partial);
                return Err(staging_failure(e));
            }
        }

        tracing::info!(
            plugin = %staged.descriptor.id,
            path = %target.display(),
            "Archive committed"
        );
        Ok(target)
    }

    /// Home-directory name for an archive that must not replace anything
    ///
    /// `preferred` is kept when no file or loaded module holds it; otherwise
    /// it is prefixed with `prefix`, then with `prefix` and a counter.
    pub fn unclaimed_file_name(&self, preferred: &str, prefix: &str) -> String {
        let held: Vec<PathBuf> = self
            .registry
            .plugins()
            .into_iter()
            .map(|info| info.descriptor.path)
            .collect();
        let claimed = |name: &str| {
            let target = self.home_dir.join(name);
            target.exists() || held.contains(&target)
        };

        if !claimed(preferred) {
            return preferred.to_string();
        }
        let mut candidate = format!("{prefix}-{preferred}");
        let mut n = 1;
        while claimed(&candidate) {
            candidate = format!("{prefix}-{n}-{preferred}");
            n += 1;
        }
        candidate
    }

    /// Drop a staged archive without committing it
    pub fn discard(&self, staged: StagedArchive) {
        remove_quietly(&staged.temp_path);
    }

    /// Stage, commit and admit an uploaded archive; returns the module id
    ///
    /// Uploading a module whose id is already loaded is rejected before
    /// anything reaches the home directory.
    pub fn install(&self, file_name: &str, bytes: &[u8]) -> Result<String, PluginHostError> {
        let staged = self.stage(file_name, bytes)?;
        let target = self.home_dir.join(&staged.file_name);

        let clash = self.registry.plugins().into_iter().find(|info| {
            info.descriptor.id == staged.descriptor.id || info.descriptor.path == target
        });
        if let Some(existing) = clash {
            self.discard(staged);
            return Err(PluginHostError::AlreadyLoaded {
                id: existing.descriptor.id,
                path: existing.descriptor.path,
            });
        }

        let path = self.commit(staged)?;
        self.registry.load_archive(&path)
    }
}

fn validate_file_name(file_name: &str) -> Result<&str, PluginHostError> {
    let name = file_name.trim();
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if plain {
        Ok(name)
    } else {
        Err(PluginHostError::StagingFailure {
            path: PathBuf::from(file_name),
            source: io::Error::new(io::ErrorKind::InvalidInput, "archive name must be a plain file name"),
        })
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}
