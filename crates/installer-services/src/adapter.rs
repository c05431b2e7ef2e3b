//! Core adapter contract for installer services.
//!
//! This module defines the trait every per-technology adapter implements,
//! the outcome type command operations report, and the cooperative
//! cancellation and wait primitives long-running operations share.

use async_trait::async_trait;
use deckhand_config::ApplicationOption;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Technology an adapter drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technology {
    /// IIS-hosted site
    Iis,
    /// Service control manager service
    WindowsService,
    /// Plain executable
    NativeApp,
    /// PostgreSQL server
    Postgres,
    /// Elasticsearch node
    Elasticsearch,
}

/// Running state of a component as reported by its hosting surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    /// State could not be determined
    #[default]
    Unknown,
    /// A reconciliation pass is in flight
    Checking,
    /// Component is not installed, so running state is meaningless
    NotAvailable,
    /// Component is installed but not running
    Stopped,
    /// Some but not all parts are running (e.g. site up, pool down)
    PartiallyRunning,
    /// Component is fully running
    Running,
}

/// Result of a command operation (start, stop, create, delete, deploy).
///
/// Failures carry diagnostic text for the operator; they are surfaced, never
/// thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the operation succeeded
    pub succeeded: bool,
    /// Diagnostic text, mandatory on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Outcome {
    /// Successful outcome without detail
    pub fn ok() -> Self {
        Self {
            succeeded: true,
            detail: None,
        }
    }

    /// Successful outcome with detail text
    pub fn ok_with(detail: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            detail: Some(detail.into()),
        }
    }

    /// Failed outcome with diagnostic text
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            detail: Some(detail.into()),
        }
    }

    /// Diagnostic text or an empty string
    pub fn detail_text(&self) -> &str {
        self.detail.as_deref().unwrap_or_default()
    }
}

/// Cooperative cancellation flag shared between a caller and an operation.
///
/// Cancellation is checked at each sleep iteration of a wait loop; it is
/// never preemptive.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a new, uncancelled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of waiting for a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Condition became true within the timeout
    Satisfied,
    /// Timeout elapsed first
    TimedOut,
    /// The cancel flag was raised first
    Cancelled,
}

/// Interval between status probes while waiting on a native operation
pub const WAIT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `probe` once per second until it returns true, `timeout` elapses or
/// `cancel` is raised.
///
/// The probe runs once immediately so an already-satisfied condition returns
/// without sleeping.
pub async fn wait_until<F, Fut>(timeout: Duration, cancel: &CancelFlag, mut probe: F) -> WaitResult
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await {
            return WaitResult::Satisfied;
        }
        if cancel.is_cancelled() {
            return WaitResult::Cancelled;
        }
        if Instant::now() >= deadline {
            return WaitResult::TimedOut;
        }
        smol::Timer::after(WAIT_PROBE_INTERVAL.min(deadline - Instant::now())).await;
    }
}

/// Convert a wait result into a command outcome
pub fn outcome_from_wait(result: WaitResult, operation: &str, name: &str) -> Outcome {
    match result {
        WaitResult::Satisfied => Outcome::ok(),
        WaitResult::TimedOut => {
            Outcome::failed(format!("Timed out waiting for {operation} of '{name}'"))
        }
        WaitResult::Cancelled => Outcome::failed(format!("{operation} of '{name}' was cancelled")),
    }
}

/// Contract every per-technology installer service adapter implements.
///
/// Queries never fail: an unreachable OS surface reports `false` /
/// [`RunningState::Unknown`] / `None`. Commands report an [`Outcome`].
#[async_trait]
pub trait InstallerService: Send + Sync {
    /// Technology this adapter drives
    fn technology(&self) -> Technology;

    /// Whether this adapter manages the given application
    fn can_handle(&self, app: &ApplicationOption) -> bool;

    /// Whether the component's files are installed
    async fn is_installed(&self, app: &ApplicationOption) -> bool;

    /// Running state as the hosting surface reports it
    async fn running_state(&self, app: &ApplicationOption) -> RunningState;

    /// Path of the installed main file, if present
    async fn installed_main_file(&self, app: &ApplicationOption) -> Option<PathBuf>;

    /// Start the component and wait until it reports running
    async fn start(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome;

    /// Stop the component and wait until it reports stopped
    async fn stop(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome;

    /// Register the component with its hosting surface
    async fn create(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome;

    /// Remove the component's registration from its hosting surface
    async fn delete(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome;
}
