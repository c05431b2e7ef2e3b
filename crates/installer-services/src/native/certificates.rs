//! Certificate store helper.
//!
//! Wraps PFX import and thumbprint lookup/removal against a named machine
//! store. Production goes through `certutil.exe`.

use crate::adapter::Outcome;
use crate::tool::run_tool;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Backend trait for certificate store access
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Import a PFX file into the named store
    async fn import_pfx(&self, store: &str, pfx_path: &Path, password: &str) -> Outcome;

    /// Whether a certificate with the given thumbprint is in the store
    async fn exists(&self, store: &str, thumbprint: &str) -> bool;

    /// Remove a certificate by thumbprint
    async fn remove(&self, store: &str, thumbprint: &str) -> Outcome;
}

/// In-memory certificate store.
///
/// Uses the PFX file stem as the thumbprint, which is enough for exercising
/// callers without real certificates.
#[derive(Debug, Default)]
pub struct MemoryCertStore {
    entries: Mutex<HashSet<(String, String)>>,
}

impl MemoryCertStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificateStore for MemoryCertStore {
    async fn import_pfx(&self, store: &str, pfx_path: &Path, _password: &str) -> Outcome {
        let Some(stem) = pfx_path.file_stem().and_then(|s| s.to_str()) else {
            return Outcome::failed(format!("Not a PFX path: {}", pfx_path.display()));
        };
        self.entries
            .lock()
            .unwrap()
            .insert((store.to_string(), stem.to_string()));
        Outcome::ok_with(stem.to_string())
    }

    async fn exists(&self, store: &str, thumbprint: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .contains(&(store.to_string(), thumbprint.to_string()))
    }

    async fn remove(&self, store: &str, thumbprint: &str) -> Outcome {
        let removed = self
            .entries
            .lock()
            .unwrap()
            .remove(&(store.to_string(), thumbprint.to_string()));
        if removed {
            Outcome::ok()
        } else {
            Outcome::failed(format!("Certificate '{thumbprint}' not found in '{store}'"))
        }
    }
}

/// Certificate store backend driving `certutil.exe`
pub struct CertutilStore {
    certutil_path: PathBuf,
}

impl CertutilStore {
    /// Create a backend using `certutil` from the search path
    pub fn new() -> Self {
        Self {
            certutil_path: PathBuf::from("certutil"),
        }
    }

    /// Create a backend with an explicit `certutil.exe` path
    pub fn with_certutil_path(certutil_path: impl Into<PathBuf>) -> Self {
        Self {
            certutil_path: certutil_path.into(),
        }
    }
}

impl Default for CertutilStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateStore for CertutilStore {
    async fn import_pfx(&self, store: &str, pfx_path: &Path, password: &str) -> Outcome {
        info!(store, pfx = %pfx_path.display(), "importing certificate");
        let args = [
            "-f".to_string(),
            "-p".to_string(),
            password.to_string(),
            "-importpfx".to_string(),
            store.to_string(),
            pfx_path.display().to_string(),
        ];
        match run_tool(&self.certutil_path, args).await {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(out.text().trim().to_string()),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    async fn exists(&self, store: &str, thumbprint: &str) -> bool {
        let args = [
            "-store".to_string(),
            store.to_string(),
            thumbprint.to_string(),
        ];
        matches!(run_tool(&self.certutil_path, args).await, Ok(out) if out.success)
    }

    async fn remove(&self, store: &str, thumbprint: &str) -> Outcome {
        let args = [
            "-delstore".to_string(),
            store.to_string(),
            thumbprint.to_string(),
        ];
        match run_tool(&self.certutil_path, args).await {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(out.text().trim().to_string()),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}
