//! Filesystem operations used by deploys.

use crate::{Error, Result};
use deckhand_config::ApplicationOption;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Copy a directory tree recursively, overwriting existing files
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Back up `install_path` into `backups_root`, returning the backup path.
///
/// The backup directory is suffixed with the installed version when known,
/// a timestamp otherwise. A missing install directory is not an error; there
/// is simply nothing to back up.
pub fn backup_dir(
    install_path: &Path,
    backups_root: &Path,
    component: &str,
    installed_version: Option<&str>,
) -> Result<Option<PathBuf>> {
    if !install_path.is_dir() {
        debug!(component, "no install directory to back up");
        return Ok(None);
    }

    let suffix = match installed_version {
        Some(version) => version.to_string(),
        None => chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string(),
    };
    let backup = backups_root.join(format!("{component}-{suffix}"));

    if backup.exists() {
        std::fs::remove_dir_all(&backup)?;
    }
    copy_dir_recursive(install_path, &backup)?;

    info!(component, backup = %backup.display(), "backed up install directory");
    Ok(Some(backup))
}

/// Apply a component's configuration-file edits to its installed files.
///
/// Each edit rewrites one JSON-pointer location in one file under the
/// install path. A missing file or pointer is an error so a deploy never
/// silently ships a half-edited configuration.
pub fn apply_config_edits(app: &ApplicationOption, install_path: &Path) -> Result<()> {
    for edit in &app.config_edits {
        let file = install_path.join(&edit.file);
        let text = std::fs::read_to_string(&file).map_err(|e| {
            Error::Package(format!(
                "Config edit target missing: {}: {e}",
                file.display()
            ))
        })?;

        let mut document: serde_json::Value = serde_json::from_str(&text)?;
        match document.pointer_mut(&edit.pointer) {
            Some(slot) => *slot = edit.value.clone(),
            None => {
                return Err(Error::Package(format!(
                    "Config edit pointer '{}' not found in {}",
                    edit.pointer,
                    file.display()
                )));
            }
        }

        std::fs::write(&file, serde_json::to_string_pretty(&document)?)?;
        debug!(
            component = %app.name,
            file = %file.display(),
            pointer = %edit.pointer,
            "applied config edit"
        );
    }
    Ok(())
}
