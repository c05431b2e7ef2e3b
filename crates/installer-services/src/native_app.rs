//! Installer service adapter for plain executable components.
//!
//! Nothing is registered with the OS for these: the main file is the process.
//! Running state comes from a process-name probe, start spawns the main file
//! detached, stop kills by image name.

use crate::adapter::{
    CancelFlag, InstallerService, Outcome, RunningState, Technology, outcome_from_wait, wait_until,
};
use crate::tool::{run_tool, spawn_detached};
use async_trait::async_trait;
use deckhand_config::{ApplicationOption, ComponentType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Adapter for components that are plain executables
pub struct NativeAppInstaller;

impl NativeAppInstaller {
    /// Create a native app adapter
    pub fn new() -> Self {
        Self
    }

    /// Probe whether a process with the main file's image name is running
    async fn process_running(&self, image: &str) -> RunningState {
        let result = if cfg!(windows) {
            let filter = format!("IMAGENAME eq {image}");
            run_tool("tasklist", ["/NH", "/FI", filter.as_str()])
                .await
                .map(|out| out.success && out.text().contains(image))
        } else {
            // pgrep exits 1 for "no match", which is a definite answer.
            run_tool("pgrep", ["-f", image])
                .await
                .map(|out| out.success)
        };

        match result {
            Ok(true) => RunningState::Running,
            Ok(false) => RunningState::Stopped,
            Err(e) => {
                warn!(image, error = %e, "process probe failed");
                RunningState::Unknown
            }
        }
    }

    async fn kill_process(&self, image: &str) -> Outcome {
        let result = if cfg!(windows) {
            run_tool("taskkill", ["/F", "/IM", image]).await
        } else {
            run_tool("pkill", ["-f", image]).await
        };

        match result {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(format!(
                "Could not terminate '{}': {}",
                image,
                out.text().trim()
            )),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}

impl Default for NativeAppInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallerService for NativeAppInstaller {
    fn technology(&self) -> Technology {
        Technology::NativeApp
    }

    fn can_handle(&self, app: &ApplicationOption) -> bool {
        app.component_type == ComponentType::Application
    }

    async fn is_installed(&self, app: &ApplicationOption) -> bool {
        app.main_file_path().is_some_and(|p| p.is_file())
    }

    async fn running_state(&self, app: &ApplicationOption) -> RunningState {
        let Some(image) = app.main_file.as_deref() else {
            return RunningState::NotAvailable;
        };
        self.process_running(image).await
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
        let Some(main_file) = self.installed_main_file(app).await else {
            return Outcome::failed(format!("Component '{}' is not installed", app.name));
        };
        let image = app.main_file.clone().unwrap_or_default();

        info!(main_file = %main_file.display(), "starting application");
        if let Err(e) = spawn_detached(&main_file, Vec::<String>::new()) {
            return Outcome::failed(e.to_string());
        }

        let result = wait_until(timeout, cancel, || async {
            self.process_running(&image).await == RunningState::Running
        })
        .await;
        outcome_from_wait(result, "start", &app.name)
    }

    async fn stop(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let Some(image) = app.main_file.clone() else {
            return Outcome::failed(format!("Component '{}' has no main file", app.name));
        };

        if self.process_running(&image).await == RunningState::Stopped {
            return Outcome::ok();
        }

        info!(image, "stopping application");
        let outcome = self.kill_process(&image).await;
        if !outcome.succeeded {
            return outcome;
        }

        let result = wait_until(timeout, cancel, || async {
            self.process_running(&image).await == RunningState::Stopped
        })
        .await;
        outcome_from_wait(result, "stop", &app.name)
    }

    async fn create(
        &self,
        _app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        // Plain executables have no OS registration.
        Outcome::ok()
    }

    async fn delete(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        self.stop(app, timeout, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn native_app(main_file: Option<&str>) -> ApplicationOption {
        ApplicationOption {
            name: "acme-agent".to_string(),
            component_type: ComponentType::Application,
            hosting_framework: Default::default(),
            install_path: Some(PathBuf::from("/opt/acme-agent")),
            main_file: main_file.map(str::to_string),
            package: None,
            dependent_components: vec![],
            dependent_services: vec![],
            settings: HashMap::new(),
            folder_permissions: vec![],
            firewall_rules: vec![],
            config_edits: vec![],
            endpoints: vec![],
        }
    }

    #[smol_potat::test]
    async fn test_no_main_file_is_not_available() {
        let installer = NativeAppInstaller::new();
        let app = native_app(None);
        assert_eq!(
            installer.running_state(&app).await,
            RunningState::NotAvailable
        );
    }

    #[smol_potat::test]
    async fn test_missing_file_is_not_installed() {
        let installer = NativeAppInstaller::new();
        let app = native_app(Some("acme-agent-not-on-disk"));
        assert!(!installer.is_installed(&app).await);
        assert_eq!(installer.installed_main_file(&app).await, None);
    }

    #[smol_potat::test]
    async fn test_start_without_install_fails_with_detail() {
        let installer = NativeAppInstaller::new();
        let app = native_app(Some("acme-agent-not-on-disk"));
        let outcome = installer
            .start(&app, Duration::from_secs(1), &CancelFlag::new())
            .await;
        assert!(!outcome.succeeded);
        assert!(outcome.detail_text().contains("not installed"));
    }
}
