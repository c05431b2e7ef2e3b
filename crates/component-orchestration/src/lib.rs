//! # Component Orchestration
//!
//! Component state reconciliation engine for deckhand.
//!
//! One [`ComponentProvider`] owns each configured application's lifecycle:
//! it resolves installation files, compares versions, queries the
//! per-technology installer service adapter and publishes every state change
//! on a [`StateBus`]. The [`DeploymentManager`] builds one provider per
//! configured application and relays deploy/start/stop commands; the
//! [`PollingLoop`] triggers a reconciliation pass for every non-busy
//! component on a fixed interval.
//!
//! ## Example
//!
//! ```rust
//! use component_orchestration::{AdapterSet, DeploymentManager};
//! use deckhand_config::InstallationSettings;
//!
//! # async fn example(settings: InstallationSettings) -> component_orchestration::Result<()> {
//! let manager = DeploymentManager::builder(settings)
//!     .adapters(AdapterSet::with_defaults())
//!     .build()?;
//!
//! for (name, state) in manager.states() {
//!     println!("{name}: {:?}/{:?}", state.installation, state.running);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod events;
mod fsops;
mod manager;
mod package;
mod paths;
mod provider;
mod state;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use events::{StateBus, StateChange};
pub use fsops::{apply_config_edits, backup_dir, copy_dir_recursive};
pub use manager::{AdapterSet, DeploymentManager, DeploymentManagerBuilder, PollingLoop};
pub use package::{PackageManifest, read_manifest, unpack_package};
pub use paths::DataDirs;
pub use provider::ComponentProvider;
pub use state::{ComponentState, DependentService, InstallationState};

// The running-state axis is shared with the adapters.
pub use installer_services::{CancelFlag, Outcome, RunningState};

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] deckhand_config::ConfigError),

    /// Installer service errors
    #[error("Installer service error: {0}")]
    Installer(#[from] installer_services::Error),

    /// No configured component with the given name
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// No installer service adapter accepts the component
    #[error("No installer service for component: {0}")]
    NoInstallerService(String),

    /// Package archive or manifest problem
    #[error("Package error: {0}")]
    Package(String),

    /// Manifest or config-file JSON problem
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
