//! Program-data directory tree.
//!
//! Downloaded packages, unpacked files, backups and logs all live under one
//! per-installation data root.

use std::io;
use std::path::{Path, PathBuf};

/// The data directory tree used by orchestration
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    /// Create a tree rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root under the local application data directory
    pub fn default_root() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deckhand")
    }

    /// Create every directory of the tree
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.packages(),
            self.unpacked(),
            self.backups(),
            self.logs(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Root of the tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloaded package archives
    pub fn packages(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Unpacked package contents, one directory per component
    pub fn unpacked(&self) -> PathBuf {
        self.root.join("unpacked")
    }

    /// Pre-deploy backups of install directories
    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Log files
    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Unpacked directory for one component
    pub fn unpacked_component(&self, component: &str) -> PathBuf {
        self.unpacked().join(component)
    }
}
