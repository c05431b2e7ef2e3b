//! Installer package handling.
//!
//! Packages are `.tar.gz` archives with a `version.json` manifest at the
//! root naming the component and its version. Unpacking replaces the
//! component's unpacked directory wholesale.

use crate::{Error, Result, version::FileVersion};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Manifest at the root of every installer package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Component name the package belongs to
    pub name: String,
    /// Version the package carries
    pub version: String,
}

impl PackageManifest {
    /// The manifest version as a comparable [`FileVersion`]
    pub fn file_version(&self) -> FileVersion {
        FileVersion::new(self.version.clone())
    }
}

/// Read the `version.json` manifest from an unpacked package directory
pub fn read_manifest(unpacked_dir: &Path) -> Result<PackageManifest> {
    let path = unpacked_dir.join("version.json");
    let text = std::fs::read_to_string(&path).map_err(|e| {
        Error::Package(format!(
            "No manifest at {}: {e}",
            path.display()
        ))
    })?;
    let manifest: PackageManifest = serde_json::from_str(&text)?;
    Ok(manifest)
}

/// Unpack a package archive into `dest`, replacing previous contents, and
/// verify its manifest names `component`.
pub fn unpack_package(archive: &Path, dest: &Path, component: &str) -> Result<PackageManifest> {
    if !archive.is_file() {
        return Err(Error::Package(format!(
            "Package archive not found: {}",
            archive.display()
        )));
    }

    if dest.exists() {
        debug!(dest = %dest.display(), "removing previous unpacked contents");
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;

    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest)?;

    let manifest = read_manifest(dest)?;
    if manifest.name != component {
        return Err(Error::Package(format!(
            "Package manifest names '{}', expected '{}'",
            manifest.name, component
        )));
    }

    info!(
        component,
        version = %manifest.version,
        "unpacked package"
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a small package archive with a manifest and one payload file
    pub(crate) fn build_archive(dir: &Path, name: &str, version: &str) -> std::path::PathBuf {
        let stage = dir.join("stage");
        std::fs::create_dir_all(&stage).unwrap();
        std::fs::write(
            stage.join("version.json"),
            format!(r#"{{ "name": "{name}", "version": "{version}" }}"#),
        )
        .unwrap();
        std::fs::write(stage.join("main.bin"), b"payload").unwrap();

        let archive_path = dir.join(format!("{name}.tar.gz"));
        let file = File::create(&archive_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &stage).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        archive_path
    }

    #[test]
    fn test_unpack_and_read_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = build_archive(dir.path(), "acme-site", "2.0.0.0");
        let dest = dir.path().join("unpacked");

        let manifest = unpack_package(&archive, &dest, "acme-site").unwrap();
        assert_eq!(manifest.name, "acme-site");
        assert_eq!(manifest.version, "2.0.0.0");
        assert!(dest.join("main.bin").is_file());
    }

    #[test]
    fn test_unpack_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let archive = build_archive(dir.path(), "acme-site", "2.0.0.0");
        let dest = dir.path().join("unpacked");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.bin"), b"old").unwrap();

        unpack_package(&archive, &dest, "acme-site").unwrap();
        assert!(!dest.join("stale.bin").exists());
    }

    #[test]
    fn test_manifest_name_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = build_archive(dir.path(), "other-component", "1.0");
        let dest = dir.path().join("unpacked");

        let err = unpack_package(&archive, &dest, "acme-site").unwrap_err();
        assert!(matches!(err, Error::Package(_)));
    }

    #[test]
    fn test_missing_archive_is_a_package_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_package(
            &dir.path().join("nope.tar.gz"),
            &dir.path().join("unpacked"),
            "acme-site",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Package(_)));
    }
}
