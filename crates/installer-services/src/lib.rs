//! # Installer Services
//!
//! Per-technology installer service adapters for deckhand.
//!
//! Each adapter is a facade over one OS hosting surface (IIS, the service
//! control manager, PostgreSQL, Elasticsearch, plain executables) and answers
//! the same four questions: is the component installed, is it running, where
//! is its main file, and how is it started, stopped, created or deleted.
//!
//! Adapters never let an OS failure cross the boundary as an error: queries
//! degrade to `Unknown`/`NotAvailable` and commands report an [`Outcome`]
//! with diagnostic text instead.

#![warn(missing_docs)]

pub mod adapter;
pub mod blob;
pub mod elasticsearch;
pub mod iis;
pub mod native;
pub mod native_app;
pub mod postgres;
pub mod probe;
pub mod tool;
pub mod windows_service;

pub use adapter::{CancelFlag, InstallerService, Outcome, RunningState, Technology, WaitResult};
pub use blob::BlobPackageSource;
pub use elasticsearch::ElasticsearchInstaller;
pub use iis::IisInstaller;
pub use native_app::NativeAppInstaller;
pub use postgres::PostgresInstaller;
pub use windows_service::WindowsServiceInstaller;

/// Error types for installer service operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An OS tool could not be executed
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// Tool binary name
        tool: String,
        /// Failure description
        message: String,
    },

    /// HTTP transfer error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] deckhand_config::ConfigError),
}

/// Result type for installer service operations
pub type Result<T> = std::result::Result<T, Error>;
