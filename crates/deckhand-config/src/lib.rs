//! # Deckhand Configuration
//!
//! JSON installation settings parser for deckhand.
//!
//! This crate loads the "custom settings" and "template settings" documents,
//! merges them into one effective installation settings document, and resolves
//! `${...}` placeholders in application settings values.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod merge;
pub mod resolver;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a settings file
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Placeholder could not be resolved
    #[error("Placeholder not found: {0}")]
    PlaceholderNotFound(String),

    /// Application reference not found
    #[error("Application '{0}' not found")]
    ApplicationNotFound(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root installation settings document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallationSettings {
    /// Installation name
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Blob store the installer packages are downloaded from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_store: Option<BlobStoreSettings>,

    /// Default settings every application inherits
    #[serde(default)]
    pub defaults: HashMap<String, String>,

    /// Reconciliation poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Override for the program-data directory tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Configured applications
    #[serde(default)]
    pub applications: Vec<ApplicationOption>,
}

/// Blob store connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlobStoreSettings {
    /// Storage account URL, e.g. `https://acme.blob.core.windows.net`
    pub account_url: String,

    /// Container holding the installer packages
    pub container: String,

    /// Shared access signature query string (without the leading `?`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<String>,
}

/// Static descriptor for one deployable component. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationOption {
    /// Unique component name
    pub name: String,

    /// How the component is hosted by the OS
    #[serde(default)]
    pub component_type: ComponentType,

    /// Runtime the component's main file targets
    #[serde(default)]
    pub hosting_framework: HostingFramework,

    /// Directory the component is installed into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,

    /// Main file name relative to the install path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,

    /// Package archive name in the blob container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Components whose state this component mirrors
    #[serde(default)]
    pub dependent_components: Vec<String>,

    /// OS services this component requires
    #[serde(default)]
    pub dependent_services: Vec<String>,

    /// Application settings; values may contain `${...}` placeholders
    #[serde(default)]
    pub settings: HashMap<String, String>,

    /// Folder permissions applied at deploy time
    #[serde(default)]
    pub folder_permissions: Vec<FolderPermission>,

    /// Firewall rules applied at deploy time
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRuleOption>,

    /// Edits applied to the component's own configuration file at deploy time
    #[serde(default)]
    pub config_edits: Vec<ConfigEdit>,

    /// Endpoints the component exposes
    #[serde(default)]
    pub endpoints: Vec<EndpointOption>,
}

/// Component type variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    /// Plain executable application
    Application,
    /// Service registered with the service control manager
    WindowsService,
    /// IIS-hosted site
    InternetInformationService,
    /// PostgreSQL server instance
    PostgreSqlServer,
    /// Elasticsearch node
    Elasticsearch,
    /// Descriptor only, nothing to manage
    #[default]
    None,
}

/// Hosting framework variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingFramework {
    /// Native binary
    #[default]
    Native,
    /// .NET Framework 4.8
    NetFramework48,
    /// .NET 7
    Net7,
    /// .NET 8
    Net8,
    /// Node.js
    NodeJs,
}

/// Folder permission granted at deploy time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderPermission {
    /// Folder the permission applies to
    pub path: PathBuf,

    /// Account the permission is granted to
    pub account: String,

    /// Granted right, e.g. "read", "modify", "full"
    pub right: String,
}

/// Firewall rule opened for a component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FirewallRuleOption {
    /// Rule name
    pub name: String,

    /// TCP port the rule allows
    pub port: u16,
}

/// One edit applied to a deployed component's configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigEdit {
    /// Configuration file relative to the install path
    pub file: String,

    /// JSON pointer to the value to rewrite, e.g. `/Logging/LogLevel/Default`
    pub pointer: String,

    /// Replacement value
    pub value: serde_json::Value,
}

/// Endpoint a component exposes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointOption {
    /// Endpoint name (e.g. "http", "health")
    pub name: String,

    /// Endpoint URL
    pub url: String,
}

fn default_poll_interval() -> u64 {
    3
}

impl InstallationSettings {
    /// Look up an application descriptor by name
    pub fn application(&self, name: &str) -> Result<&ApplicationOption> {
        self.applications
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| ConfigError::ApplicationNotFound(name.to_string()))
    }
}

impl ApplicationOption {
    /// Expected path of the installed main file, if both parts are configured
    pub fn main_file_path(&self) -> Option<PathBuf> {
        match (&self.install_path, &self.main_file) {
            (Some(dir), Some(file)) => Some(dir.join(file)),
            _ => None,
        }
    }
}

/// Load one settings document from a JSON file
pub fn load_file(path: impl AsRef<Path>) -> Result<InstallationSettings> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let settings = serde_json::from_str(&content)?;
    Ok(settings)
}

/// Load custom and template documents, merge them, write the effective
/// document to `out_path` and return it.
///
/// The custom document wins wherever both define a value; applications are
/// merged by name. The effective document is what every later operation works
/// from, mirroring what ends up on disk.
pub fn load_effective(
    custom_path: impl AsRef<Path>,
    template_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
) -> Result<InstallationSettings> {
    let custom = std::fs::read_to_string(custom_path.as_ref())?;
    let template = std::fs::read_to_string(template_path.as_ref())?;

    let custom: serde_json::Value = serde_json::from_str(&custom)?;
    let template: serde_json::Value = serde_json::from_str(&template)?;

    let effective = merge::merge_documents(custom, template);
    let settings: InstallationSettings = serde_json::from_value(effective.clone())?;

    validate(&settings)?;

    std::fs::write(out_path.as_ref(), serde_json::to_string_pretty(&effective)?)?;
    Ok(settings)
}

/// Validate an effective settings document
pub fn validate(settings: &InstallationSettings) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for app in &settings.applications {
        if !seen.insert(app.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Duplicate application name: {}",
                app.name
            )));
        }
    }

    for app in &settings.applications {
        for dep in &app.dependent_components {
            if !seen.contains(dep.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Application '{}' depends on unknown component '{}'",
                    app.name, dep
                )));
            }
        }

        if app.component_type == ComponentType::None
            && (app.package.is_some() || app.install_path.is_some())
        {
            return Err(ConfigError::ValidationError(format!(
                "Application '{}' has type 'none' but carries deploy data",
                app.name
            )));
        }
    }

    Ok(())
}
