//! Cache Controller
//!
//! Cold iterations start from empty package-manager caches: the known cache
//! directories are deleted beforehand, and the invocation's cache variables
//! point at a scratch directory that lives only for that iteration.

use crate::config::CacheConfig;
use initbench_core::PackageManager;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of scratch cache directories under the system temp dir
pub const SCRATCH_PREFIX: &str = "benchmark-cache-";

/// Wipes cache locations and provisions scratch cache directories
#[derive(Debug, Clone)]
pub struct CacheController {
    caches: CacheConfig,
    scratch_root: Option<PathBuf>,
}

impl CacheController {
    /// Controller for the configured cache locations
    pub fn new(caches: CacheConfig) -> Self {
        Self {
            caches,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Delete every known cache location of a package manager; unknown names are a no-op
    pub fn wipe_package_manager_cache(&self, name: &str) {
        let Ok(pm) = name.parse::<PackageManager>() else {
            tracing::debug!(package_manager = name, "no known caches");
            return;
        };
        for path in self.caches.paths_for(pm) {
            if path.exists() {
                tracing::info!("Cleaning package manager cache: {}", path.display());
                remove_path(&path);
            }
        }
    }

    /// Delete the secondary (browser) cache
    pub fn wipe_secondary_cache(&self) {
        for path in self.caches.secondary_paths() {
            if path.exists() {
                tracing::info!("Cleaning secondary cache: {}", path.display());
                remove_path(&path);
            }
        }
    }

    /// Fresh, uniquely named, empty directory for redirected caches
    pub fn create_scratch_cache_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    /// Remove a scratch directory; failures are logged and ignored
    pub fn destroy_scratch_cache_dir(&self, dir: TempDir) {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            tracing::debug!("Could not remove scratch cache {}: {}", path.display(), e);
        }
    }
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
    }
}
