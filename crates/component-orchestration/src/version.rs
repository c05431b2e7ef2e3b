//! Version comparison for installed components and packages.
//!
//! Versions are dotted strings compared component-wise: numeric components
//! compare numerically, anything else falls back to ordinal string order.
//! The ordinal fallback is not guaranteed correct for every version format
//! in the wild; it matches the tool's long-standing behavior and stays.

use deckhand_config::HostingFramework;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// A dotted version string with component-wise ordering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileVersion {
    raw: String,
}

impl FileVersion {
    /// Wrap a raw version string
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The raw version text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this version orders strictly after `other`
    pub fn is_newer_than(&self, other: &FileVersion) -> bool {
        self.cmp(other) == Ordering::Greater
    }

    fn components(&self) -> Vec<&str> {
        self.raw.trim().split('.').collect()
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for FileVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.components();
        let right = other.components();
        let len = left.len().max(right.len());

        for i in 0..len {
            // A missing tail component counts as zero, so "2.0" == "2.0.0.0".
            let l = left.get(i).copied().unwrap_or("0");
            let r = right.get(i).copied().unwrap_or("0");

            let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                (Ok(l), Ok(r)) => l.cmp(&r),
                _ => l.cmp(r),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

impl PartialOrd for FileVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with the ordering, so "2.0" equals "2.0.0.0".
impl PartialEq for FileVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FileVersion {}

/// Version manifest carried at the root of a component's files
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionDocument {
    version: String,
}

/// Read the version of an installed main file.
///
/// Node components carry a `version.json` next to the main file; everything
/// else is probed through a `<main>.version` sidecar first and, on Windows,
/// the file version metadata of the binary itself.
pub async fn installed_version(
    main_file: &Path,
    framework: HostingFramework,
) -> Option<FileVersion> {
    if framework == HostingFramework::NodeJs {
        let manifest = main_file.parent()?.join("version.json");
        return read_version_document(&manifest);
    }

    let sidecar = sidecar_path(main_file);
    if let Ok(text) = std::fs::read_to_string(&sidecar) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return Some(FileVersion::new(trimmed));
        }
    }

    if cfg!(windows) {
        return file_metadata_version(main_file).await;
    }

    None
}

/// Read a `version.json` document's version field
pub fn read_version_document(path: &Path) -> Option<FileVersion> {
    let text = std::fs::read_to_string(path).ok()?;
    let doc: VersionDocument = serde_json::from_str(&text).ok()?;
    Some(FileVersion::new(doc.version))
}

fn sidecar_path(main_file: &Path) -> std::path::PathBuf {
    let mut name = main_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".version");
    main_file.with_file_name(name)
}

/// Probe the binary's embedded file version through PowerShell
async fn file_metadata_version(main_file: &Path) -> Option<FileVersion> {
    let script = format!(
        "(Get-Item '{}').VersionInfo.FileVersion",
        main_file.display()
    );
    let output =
        installer_services::tool::run_tool("powershell", ["-NoProfile", "-Command", script.as_str()])
            .await
            .ok()?;
    if !output.success {
        return None;
    }

    let version = output.stdout.trim();
    if version.is_empty() {
        None
    } else {
        Some(FileVersion::new(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison_beats_lexicographic() {
        let newer = FileVersion::new("2.0.0.0");
        let older = FileVersion::new("1.9.9.9");
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
    }

    #[test]
    fn test_is_newer_than_is_antisymmetric() {
        let pairs = [
            ("1.0", "1.0.0.0"),
            ("2.1.3", "2.1.4"),
            ("10.0", "9.9"),
            ("1.0-beta", "1.0-alpha"),
            ("3.2.1", "3.2.1"),
        ];
        for (a, b) in pairs {
            let a = FileVersion::new(a);
            let b = FileVersion::new(b);
            assert!(
                !(a.is_newer_than(&b) && b.is_newer_than(&a)),
                "both newer: {a} vs {b}"
            );
        }
    }

    #[test]
    fn test_zero_tail_compares_equal() {
        assert_eq!(FileVersion::new("2.0"), FileVersion::new("2.0"));
        assert_eq!(
            FileVersion::new("2.0").cmp(&FileVersion::new("2.0.0.0")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_non_numeric_falls_back_to_ordinal() {
        let beta = FileVersion::new("1.0-beta");
        let alpha = FileVersion::new("1.0-alpha");
        assert!(beta.is_newer_than(&alpha));
    }

    #[smol_potat::test]
    async fn test_node_version_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let main_file = dir.path().join("server.js");
        std::fs::write(&main_file, "// entry").unwrap();
        std::fs::write(
            dir.path().join("version.json"),
            r#"{ "name": "acme-portal", "version": "3.4.5" }"#,
        )
        .unwrap();

        let version = installed_version(&main_file, HostingFramework::NodeJs).await;
        assert_eq!(version, Some(FileVersion::new("3.4.5")));
    }

    #[smol_potat::test]
    async fn test_sidecar_version_for_dotnet() {
        let dir = tempfile::tempdir().unwrap();
        let main_file = dir.path().join("AcmeWorker.exe");
        std::fs::write(&main_file, b"binary").unwrap();
        std::fs::write(dir.path().join("AcmeWorker.exe.version"), "1.2.3.4\n").unwrap();

        let version = installed_version(&main_file, HostingFramework::Net8).await;
        assert_eq!(version, Some(FileVersion::new("1.2.3.4")));
    }

    #[smol_potat::test]
    async fn test_missing_version_sources_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let main_file = dir.path().join("AcmeWorker.exe");
        std::fs::write(&main_file, b"binary").unwrap();

        #[cfg(not(windows))]
        assert_eq!(
            installed_version(&main_file, HostingFramework::Net8).await,
            None
        );
    }
}
