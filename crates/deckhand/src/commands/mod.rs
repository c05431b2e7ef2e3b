//! CLI command implementations.

pub mod deploy;
pub mod start;
pub mod status;
pub mod stop;
pub mod validate;
pub mod watch;

use anyhow::{Context, Result};
use component_orchestration::{DeploymentManager, Outcome};
use deckhand_config::InstallationSettings;
use installer_services::native::firewall::NetshFirewall;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Settings file locations shared by every command
pub struct SettingsPaths {
    /// Custom settings document
    pub custom: PathBuf,
    /// Template settings document
    pub template: PathBuf,
    /// Effective settings output path
    pub effective_out: PathBuf,
}

/// Load the effective installation settings.
///
/// With both documents present they are merged and the effective document is
/// written out; with only the custom document present it is used as-is.
pub fn load_settings(paths: &SettingsPaths) -> Result<InstallationSettings> {
    let settings = if paths.template.is_file() {
        deckhand_config::load_effective(&paths.custom, &paths.template, &paths.effective_out)
            .with_context(|| {
                format!(
                    "Failed to merge {} over {}",
                    paths.custom.display(),
                    paths.template.display()
                )
            })?
    } else {
        let settings = deckhand_config::load_file(&paths.custom)
            .with_context(|| format!("Failed to load {}", paths.custom.display()))?;
        deckhand_config::validate(&settings)?;
        settings
    };

    let context = deckhand_config::resolver::ResolutionContext::from_settings(&settings);
    let resolved = deckhand_config::resolver::resolve_placeholders(&settings, &context)?;
    debug!(
        installation = %resolved.name,
        applications = resolved.applications.len(),
        "settings loaded"
    );
    Ok(resolved)
}

/// Build a deployment manager over the production adapter set
pub fn build_manager(settings: InstallationSettings) -> Result<DeploymentManager> {
    let manager = DeploymentManager::builder(settings)
        .firewall(Arc::new(NetshFirewall::new()))
        .build()
        .context("Failed to initialize deployment manager")?;
    Ok(manager)
}

/// Print a command outcome and fail the process on an unsuccessful one
pub fn report_outcome(operation: &str, component: &str, outcome: &Outcome) -> Result<()> {
    if outcome.succeeded {
        match &outcome.detail {
            Some(detail) => println!("✓ {operation} {component}: {detail}"),
            None => println!("✓ {operation} {component}"),
        }
        Ok(())
    } else {
        anyhow::bail!("{operation} {component} failed: {}", outcome.detail_text());
    }
}
