//! Installer service adapter for SCM-hosted services.
//!
//! Drives the service control manager through `sc.exe`. The `STATE` line of
//! `sc query` output is the single source of truth for running state; start
//! and stop issue the command and then poll that state until the timeout.

use crate::adapter::{
    CancelFlag, InstallerService, Outcome, RunningState, Technology, outcome_from_wait, wait_until,
};
use crate::tool::run_tool;
use async_trait::async_trait;
use deckhand_config::{ApplicationOption, ComponentType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// `sc query` exit code for a service that is not installed
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

/// Adapter for services registered with the service control manager
pub struct WindowsServiceInstaller {
    sc_path: PathBuf,
}

impl WindowsServiceInstaller {
    /// Create an adapter using `sc` from the search path
    pub fn new() -> Self {
        Self {
            sc_path: PathBuf::from("sc"),
        }
    }

    /// Create an adapter with an explicit `sc.exe` path
    pub fn with_sc_path(sc_path: impl Into<PathBuf>) -> Self {
        Self {
            sc_path: sc_path.into(),
        }
    }

    /// Service name: the `service_name` setting when present, the component
    /// name otherwise.
    pub fn service_name(app: &ApplicationOption) -> &str {
        app.settings
            .get("service_name")
            .map(String::as_str)
            .unwrap_or(&app.name)
    }

    async fn query_state(&self, service: &str) -> RunningState {
        match run_tool(&self.sc_path, ["query", service]).await {
            Ok(out) if out.success => parse_sc_state(out.text()),
            Ok(out) if out.code == Some(ERROR_SERVICE_DOES_NOT_EXIST) => RunningState::NotAvailable,
            Ok(_) => RunningState::Unknown,
            Err(e) => {
                warn!(service, error = %e, "sc query failed");
                RunningState::Unknown
            }
        }
    }
}

impl Default for WindowsServiceInstaller {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the `STATE` line of `sc query` output
fn parse_sc_state(output: &str) -> RunningState {
    let Some(state_line) = output.lines().find(|l| l.trim_start().starts_with("STATE")) else {
        return RunningState::Unknown;
    };

    if state_line.contains("RUNNING") {
        RunningState::Running
    } else if state_line.contains("STOPPED") {
        RunningState::Stopped
    } else if state_line.contains("PENDING") || state_line.contains("PAUSED") {
        RunningState::PartiallyRunning
    } else {
        RunningState::Unknown
    }
}

#[async_trait]
impl InstallerService for WindowsServiceInstaller {
    fn technology(&self) -> Technology {
        Technology::WindowsService
    }

    fn can_handle(&self, app: &ApplicationOption) -> bool {
        app.component_type == ComponentType::WindowsService
    }

    async fn is_installed(&self, app: &ApplicationOption) -> bool {
        app.main_file_path().is_some_and(|p| p.is_file())
    }

    async fn running_state(&self, app: &ApplicationOption) -> RunningState {
        self.query_state(Self::service_name(app)).await
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
        let service = Self::service_name(app).to_string();
        info!(service, "starting service");

        match run_tool(&self.sc_path, ["start", service.as_str()]).await {
            Ok(out) if !out.success => {
                return Outcome::failed(format!(
                    "sc start '{}' failed: {}",
                    service,
                    out.text().trim()
                ));
            }
            Err(e) => return Outcome::failed(e.to_string()),
            Ok(_) => {}
        }

        let result = wait_until(timeout, cancel, || async {
            self.query_state(&service).await == RunningState::Running
        })
        .await;
        outcome_from_wait(result, "start", &service)
    }

    async fn stop(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let service = Self::service_name(app).to_string();
        info!(service, "stopping service");

        // A service that is already stopped is not an error.
        if self.query_state(&service).await == RunningState::Stopped {
            return Outcome::ok();
        }

        match run_tool(&self.sc_path, ["stop", service.as_str()]).await {
            Ok(out) if !out.success => {
                return Outcome::failed(format!(
                    "sc stop '{}' failed: {}",
                    service,
                    out.text().trim()
                ));
            }
            Err(e) => return Outcome::failed(e.to_string()),
            Ok(_) => {}
        }

        let result = wait_until(timeout, cancel, || async {
            self.query_state(&service).await == RunningState::Stopped
        })
        .await;
        outcome_from_wait(result, "stop", &service)
    }

    async fn create(
        &self,
        app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        let service = Self::service_name(app).to_string();
        let Some(main_file) = app.main_file_path() else {
            return Outcome::failed(format!(
                "Component '{}' has no main file to register",
                app.name
            ));
        };

        info!(service, main_file = %main_file.display(), "registering service");

        // sc.exe requires the space after `binPath=`.
        let bin_path = main_file.display().to_string();
        match run_tool(
            &self.sc_path,
            [
                "create",
                service.as_str(),
                "binPath=",
                bin_path.as_str(),
                "start=",
                "auto",
            ],
        )
        .await
        {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(format!(
                "sc create '{}' failed: {}",
                service,
                out.text().trim()
            )),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    async fn delete(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let service = Self::service_name(app).to_string();

        let stop = self.stop(app, timeout, cancel).await;
        if !stop.succeeded {
            return stop;
        }

        match run_tool(&self.sc_path, ["delete", service.as_str()]).await {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(format!(
                "sc delete '{}' failed: {}",
                service,
                out.text().trim()
            )),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}
