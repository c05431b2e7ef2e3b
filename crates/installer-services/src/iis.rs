//! Installer service adapter for IIS-hosted sites.
//!
//! Drives IIS through `appcmd.exe`. A site and its application pool are
//! tracked as one component: both started means running, exactly one started
//! means partially running.

use crate::adapter::{
    CancelFlag, InstallerService, Outcome, RunningState, Technology, outcome_from_wait, wait_until,
};
use crate::probe::{env_candidate, first_existing_file};
use crate::tool::run_tool;
use async_trait::async_trait;
use deckhand_config::{ApplicationOption, ComponentType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Adapter for IIS sites and their application pools
pub struct IisInstaller {
    appcmd_path: PathBuf,
}

/// State of one IIS object (site or pool) as appcmd reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    Started,
    Stopped,
    Missing,
    Unknown,
}

impl IisInstaller {
    /// Create an adapter, probing the well-known `appcmd.exe` location
    pub fn new() -> Self {
        let candidates: Vec<PathBuf> = [
            env_candidate("SystemRoot", "System32/inetsrv/appcmd.exe"),
            Some(PathBuf::from(r"C:\Windows\System32\inetsrv\appcmd.exe")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            appcmd_path: first_existing_file(&candidates).unwrap_or_else(|| "appcmd".into()),
        }
    }

    /// Create an adapter with an explicit `appcmd.exe` path
    pub fn with_appcmd_path(appcmd_path: impl Into<PathBuf>) -> Self {
        Self {
            appcmd_path: appcmd_path.into(),
        }
    }

    /// Site name: the `site_name` setting when present, the component name
    /// otherwise.
    pub fn site_name(app: &ApplicationOption) -> &str {
        app.settings
            .get("site_name")
            .map(String::as_str)
            .unwrap_or(&app.name)
    }

    /// Application pool name: the `app_pool` setting when present, the
    /// component name otherwise.
    pub fn pool_name(app: &ApplicationOption) -> &str {
        app.settings
            .get("app_pool")
            .map(String::as_str)
            .unwrap_or(&app.name)
    }

    async fn object_state(&self, kind: &str, name: &str) -> ObjectState {
        let args = [
            "list".to_string(),
            kind.to_string(),
            name.to_string(),
            "/text:state".to_string(),
        ];
        match run_tool(&self.appcmd_path, args).await {
            Ok(out) if out.success => match out.text().trim() {
                "Started" => ObjectState::Started,
                "Stopped" => ObjectState::Stopped,
                // appcmd lists nothing for an unregistered object
                "" => ObjectState::Missing,
                _ => ObjectState::Unknown,
            },
            Ok(_) => ObjectState::Missing,
            Err(e) => {
                warn!(kind, name, error = %e, "appcmd list failed");
                ObjectState::Unknown
            }
        }
    }

    async fn combined_state(&self, app: &ApplicationOption) -> RunningState {
        let site = self.object_state("site", Self::site_name(app)).await;
        let pool = self.object_state("apppool", Self::pool_name(app)).await;

        match (site, pool) {
            (ObjectState::Missing, _) => RunningState::NotAvailable,
            (ObjectState::Unknown, _) | (_, ObjectState::Unknown) => RunningState::Unknown,
            (ObjectState::Started, ObjectState::Started) => RunningState::Running,
            (ObjectState::Stopped, ObjectState::Stopped) => RunningState::Stopped,
            // Pool missing counts as the not-running half of the pair.
            _ => RunningState::PartiallyRunning,
        }
    }

    async fn appcmd(&self, args: &[&str]) -> Outcome {
        match run_tool(&self.appcmd_path, args.iter().map(|s| s.to_string())).await {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(format!(
                "appcmd {} failed: {}",
                args.join(" "),
                out.text().trim()
            )),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}

impl Default for IisInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallerService for IisInstaller {
    fn technology(&self) -> Technology {
        Technology::Iis
    }

    fn can_handle(&self, app: &ApplicationOption) -> bool {
        app.component_type == ComponentType::InternetInformationService
    }

    async fn is_installed(&self, app: &ApplicationOption) -> bool {
        app.main_file_path().is_some_and(|p| p.is_file())
    }

    async fn running_state(&self, app: &ApplicationOption) -> RunningState {
        self.combined_state(app).await
    }

    async fn installed_main_file(&self, app: &ApplicationOption) -> Option<PathBuf> {
        app.main_file_path().filter(|p| p.is_file())
    }

    async fn start(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let site = Self::site_name(app).to_string();
        let pool = Self::pool_name(app).to_string();
        info!(site, pool, "starting IIS site");

        let outcome = self.appcmd(&["start", "apppool", &pool]).await;
        if !outcome.succeeded {
            return outcome;
        }
        let outcome = self.appcmd(&["start", "site", &site]).await;
        if !outcome.succeeded {
            return outcome;
        }

        let result = wait_until(timeout, cancel, || async {
            self.combined_state(app).await == RunningState::Running
        })
        .await;
        outcome_from_wait(result, "start", &site)
    }

    async fn stop(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let site = Self::site_name(app).to_string();
        let pool = Self::pool_name(app).to_string();
        info!(site, pool, "stopping IIS site");

        if self.combined_state(app).await == RunningState::Stopped {
            return Outcome::ok();
        }

        let outcome = self.appcmd(&["stop", "site", &site]).await;
        if !outcome.succeeded {
            return outcome;
        }
        let outcome = self.appcmd(&["stop", "apppool", &pool]).await;
        if !outcome.succeeded {
            return outcome;
        }

        let result = wait_until(timeout, cancel, || async {
            self.combined_state(app).await == RunningState::Stopped
        })
        .await;
        outcome_from_wait(result, "stop", &site)
    }

    async fn create(
        &self,
        app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        let site = Self::site_name(app).to_string();
        let pool = Self::pool_name(app).to_string();
        let Some(install_path) = app.install_path.as_ref() else {
            return Outcome::failed(format!(
                "Component '{}' has no install path to publish",
                app.name
            ));
        };

        let bindings = app
            .settings
            .get("bindings")
            .cloned()
            .unwrap_or_else(|| "http/*:80:".to_string());

        info!(site, pool, bindings, "registering IIS site");

        let outcome = self.appcmd(&["add", "apppool", &format!("/name:{pool}")]).await;
        if !outcome.succeeded {
            return outcome;
        }

        let physical_path = format!("/physicalPath:{}", install_path.display());
        self.appcmd(&[
            "add",
            "site",
            &format!("/name:{site}"),
            &format!("/bindings:{bindings}"),
            &physical_path,
        ])
        .await
    }

    async fn delete(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let site = Self::site_name(app).to_string();
        let pool = Self::pool_name(app).to_string();

        let stop = self.stop(app, timeout, cancel).await;
        if !stop.succeeded {
            return stop;
        }

        let outcome = self.appcmd(&["delete", "site", &site]).await;
        if !outcome.succeeded {
            return outcome;
        }
        self.appcmd(&["delete", "apppool", &pool]).await
    }
}
