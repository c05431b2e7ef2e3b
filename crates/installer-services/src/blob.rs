//! Blob store package source.
//!
//! Downloads installer package archives from the configured blob container
//! into the local packages directory. A package already on disk is not
//! downloaded again; deleting the local copy forces a fresh download.

use crate::{Error, Result};
use deckhand_config::BlobStoreSettings;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Downloads package archives from a blob container
pub struct BlobPackageSource {
    settings: BlobStoreSettings,
    packages_dir: PathBuf,
}

impl BlobPackageSource {
    /// Create a source for the given store, writing into `packages_dir`
    pub fn new(settings: BlobStoreSettings, packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            packages_dir: packages_dir.into(),
        }
    }

    /// Local path a package downloads to
    pub fn local_path(&self, package: &str) -> PathBuf {
        self.packages_dir.join(package)
    }

    /// Full blob URL for a package, SAS query included
    pub fn blob_url(&self, package: &str) -> String {
        let base = format!(
            "{}/{}/{}",
            self.settings.account_url.trim_end_matches('/'),
            self.settings.container,
            package
        );
        match &self.settings.sas_token {
            Some(sas) => format!("{base}?{}", sas.trim_start_matches('?')),
            None => base,
        }
    }

    /// Ensure the package archive is present locally, downloading it when
    /// missing. Returns the local path.
    pub async fn fetch(&self, package: &str) -> Result<PathBuf> {
        let dest = self.local_path(package);
        if dest.is_file() {
            debug!(package, "package already downloaded");
            return Ok(dest);
        }

        std::fs::create_dir_all(&self.packages_dir)?;

        // The SAS query stays out of the log line.
        info!(
            package,
            container = %self.settings.container,
            "downloading package"
        );

        let url = self.blob_url(package);
        let bytes = smol::unblock(move || -> Result<Vec<u8>> {
            let response =
                reqwest::blocking::get(&url).map_err(|e| Error::Http(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Error::Http(format!(
                    "Blob download returned {}",
                    response.status()
                )));
            }
            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| Error::Http(e.to_string()))
        })
        .await?;

        write_atomically(&dest, &bytes)?;
        Ok(dest)
    }
}

// A half-written archive must never be visible under the final name.
fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = dest.with_extension("download");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(sas: Option<&str>) -> BlobStoreSettings {
        BlobStoreSettings {
            account_url: "https://acme.blob.core.windows.net/".to_string(),
            container: "releases".to_string(),
            sas_token: sas.map(str::to_string),
        }
    }

    #[test]
    fn test_blob_url_without_sas() {
        let source = BlobPackageSource::new(store(None), "/tmp/packages");
        assert_eq!(
            source.blob_url("acme-site.tar.gz"),
            "https://acme.blob.core.windows.net/releases/acme-site.tar.gz"
        );
    }

    #[test]
    fn test_blob_url_with_sas() {
        let source = BlobPackageSource::new(store(Some("?sv=2024&sig=abc")), "/tmp/packages");
        assert_eq!(
            source.blob_url("acme-site.tar.gz"),
            "https://acme.blob.core.windows.net/releases/acme-site.tar.gz?sv=2024&sig=abc"
        );
    }

    #[smol_potat::test]
    async fn test_fetch_skips_existing_download() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("acme-site.tar.gz");
        std::fs::write(&local, b"cached archive").unwrap();

        let source = BlobPackageSource::new(store(None), dir.path());
        let fetched = source.fetch("acme-site.tar.gz").await.unwrap();
        assert_eq!(fetched, local);
        assert_eq!(std::fs::read(&fetched).unwrap(), b"cached archive");
    }
}
