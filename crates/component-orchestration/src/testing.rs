//! Test doubles for driving the engine without an OS hosting surface.

use async_trait::async_trait;
use deckhand_config::ApplicationOption;
use installer_services::{CancelFlag, InstallerService, Outcome, RunningState, Technology};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Installer service double with scriptable running state and outcomes
pub struct MockInstaller {
    technology: Technology,
    running: Mutex<RunningState>,
    start_failure: Option<String>,
}

impl MockInstaller {
    /// Create a stopped mock that accepts every application
    pub fn new() -> Self {
        Self {
            technology: Technology::WindowsService,
            running: Mutex::new(RunningState::Stopped),
            start_failure: None,
        }
    }

    /// Report the given technology
    pub fn with_technology(mut self, technology: Technology) -> Self {
        self.technology = technology;
        self
    }

    /// Make every start call fail with the given detail
    pub fn with_start_failure(mut self, detail: impl Into<String>) -> Self {
        self.start_failure = Some(detail.into());
        self
    }

    /// Force the reported running state
    pub fn set_running(&self, state: RunningState) {
        *self.running.lock().unwrap() = state;
    }
}

impl Default for MockInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallerService for MockInstaller {
    fn technology(&self) -> Technology {
        self.technology
    }

    fn can_handle(&self, _app: &ApplicationOption) -> bool {
        true
    }

    async fn is_installed(&self, app: &ApplicationOption) -> bool {
        app.main_file_path().is_some_and(|p| p.is_file())
    }

    async fn running_state(&self, _app: &ApplicationOption) -> RunningState {
        *self.running.lock().unwrap()
    }

    async fn installed_main_file(&self, app: &ApplicationOption) -> Option<PathBuf> {
        app.main_file_path().filter(|p| p.is_file())
    }

    async fn start(
        &self,
        _app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        if let Some(detail) = &self.start_failure {
            return Outcome::failed(detail.clone());
        }
        *self.running.lock().unwrap() = RunningState::Running;
        Outcome::ok()
    }

    async fn stop(
        &self,
        _app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        *self.running.lock().unwrap() = RunningState::Stopped;
        Outcome::ok()
    }

    async fn create(
        &self,
        _app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        Outcome::ok()
    }

    async fn delete(
        &self,
        _app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        *self.running.lock().unwrap() = RunningState::NotAvailable;
        Outcome::ok()
    }
}
