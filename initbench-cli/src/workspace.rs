//! Workspace Provisioner
//!
//! Every iteration runs in a fresh copy of the fixture project under the
//! runs directory, keyed `{testId}-iter{i}`.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Materializes and discards per-iteration copies of the fixture project
#[derive(Debug, Clone)]
pub struct WorkspaceProvisioner {
    fixture_dir: PathBuf,
    runs_dir: PathBuf,
}

impl WorkspaceProvisioner {
    /// Provisioner copying `fixture_dir` into subdirectories of `runs_dir`
    pub fn new(fixture_dir: impl Into<PathBuf>, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixture_dir: fixture_dir.into(),
            runs_dir: runs_dir.into(),
        }
    }

    /// Directory for a workspace key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.runs_dir.join(key)
    }

    /// Fresh copy of the fixture for `key`, replacing any leftover copy
    pub fn setup(&self, key: &str) -> anyhow::Result<PathBuf> {
        let dir = self.path_for(key);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear workspace {}", dir.display()))?;
        }
        if !self.fixture_dir.is_dir() {
            anyhow::bail!("Fixture project not found: {}", self.fixture_dir.display());
        }
        copy_tree(&self.fixture_dir, &dir).with_context(|| {
            format!(
                "Failed to copy fixture {} to {}",
                self.fixture_dir.display(),
                dir.display()
            )
        })?;
        tracing::debug!(workspace = %dir.display(), "workspace ready");
        Ok(dir)
    }

    /// Remove the workspace for `key`; a missing workspace is fine
    pub fn cleanup(&self, key: &str) -> anyhow::Result<()> {
        let dir = self.path_for(key);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove workspace {}", dir.display()))?;
        }
        Ok(())
    }
}

fn copy_tree(src: &Path, dst: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(src)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(path)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)?;
            #[cfg(not(unix))]
            {
                if path.is_file() {
                    fs::copy(path, &target)?;
                } else {
                    tracing::warn!("Skipping symlink {} -> {}", path.display(), link.display());
                }
            }
        } else {
            fs::copy(path, &target)?;
        }
    }
    Ok(())
}
