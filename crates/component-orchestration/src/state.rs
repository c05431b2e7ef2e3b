//! Component state model.
//!
//! Two orthogonal axes: installation state (files, versions) and running
//! state (hosting surface). The running axis only carries meaning when the
//! installation axis says the component is complete; every reconciliation
//! pass enforces that by pinning running state to `NotAvailable` otherwise.

use chrono::{DateTime, Utc};
use installer_services::RunningState;
use serde::{Deserialize, Serialize};

/// Installation state of a component.
///
/// Reset to `Checking` at the start of each reconciliation pass and only
/// moves forward within that pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationState {
    /// No pass has run yet
    #[default]
    Unknown,
    /// A pass is in flight
    Checking,
    /// The installer package itself is absent
    NoInstallationFiles,
    /// Package present, component files not installed
    NotInstalled,
    /// A deploy is writing files right now
    Installing,
    /// Installed, but the package carries a newer version
    InstalledWithOldVersion,
    /// Installed at the newest known version
    InstalledWithNewestVersion,
}

impl InstallationState {
    /// Whether the component's files are fully installed
    pub fn is_installed(self) -> bool {
        matches!(
            self,
            InstallationState::InstalledWithOldVersion
                | InstallationState::InstalledWithNewestVersion
        )
    }
}

/// Snapshot of one component's state after a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    /// Installation axis
    pub installation: InstallationState,
    /// Running axis, `NotAvailable` unless installation is complete
    pub running: RunningState,
    /// Version of the installed main file, when determinable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    /// Version the unpacked package carries, when determinable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    /// When this snapshot was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_at: Option<DateTime<Utc>>,
}

impl ComponentState {
    /// Snapshot with both axes set to checking
    pub fn checking() -> Self {
        Self {
            installation: InstallationState::Checking,
            running: RunningState::Checking,
            installed_version: None,
            package_version: None,
            changed_at: Some(Utc::now()),
        }
    }
}

/// Mirror of another component's state, tracked by name only.
///
/// Updated exclusively through bus notifications; holding one implies no
/// ownership of the referenced component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentService {
    /// Name of the referenced component
    pub name: String,
    /// Last installation state seen on the bus
    pub installation: InstallationState,
    /// Last running state seen on the bus
    pub running: RunningState,
}

impl DependentService {
    /// Create a mirror that has not seen a notification yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installation: InstallationState::Unknown,
            running: RunningState::Unknown,
        }
    }
}
