//! Deployment manager and polling loop.
//!
//! The manager builds one [`ComponentProvider`] per configured application
//! and relays user commands to them. The polling loop wakes on a fixed
//! interval and triggers a reconciliation pass for every component that is
//! not already busy; each pass runs on its own task, so a slow component
//! never delays the others.

use crate::events::{StateBus, StateChange};
use crate::paths::DataDirs;
use crate::provider::ComponentProvider;
use crate::state::ComponentState;
use crate::{Error, Result};
use deckhand_config::{ComponentType, InstallationSettings};
use installer_services::{
    BlobPackageSource, CancelFlag, ElasticsearchInstaller, IisInstaller, InstallerService,
    NativeAppInstaller, Outcome, PostgresInstaller, WindowsServiceInstaller,
    native::firewall::FirewallBackend,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered set of installer service adapters
pub struct AdapterSet {
    adapters: Vec<Arc<dyn InstallerService>>,
}

impl AdapterSet {
    /// Empty set, for building up from custom adapters
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// The full default adapter set, one per supported technology
    pub fn with_defaults() -> Self {
        Self {
            adapters: vec![
                Arc::new(IisInstaller::new()),
                Arc::new(WindowsServiceInstaller::new()),
                Arc::new(NativeAppInstaller::new()),
                Arc::new(PostgresInstaller::new()),
                Arc::new(ElasticsearchInstaller::new()),
            ],
        }
    }

    /// Add an adapter to the set
    pub fn register(mut self, adapter: Arc<dyn InstallerService>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// First adapter accepting the application, in registration order
    pub fn find_for(
        &self,
        app: &deckhand_config::ApplicationOption,
    ) -> Option<Arc<dyn InstallerService>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.can_handle(app))
            .cloned()
    }
}

impl Default for AdapterSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Central orchestrator over all configured components
pub struct DeploymentManager {
    settings: InstallationSettings,
    providers: HashMap<String, Arc<ComponentProvider>>,
    order: Vec<String>,
    bus: StateBus,
    dirs: DataDirs,
}

/// Builder for [`DeploymentManager`]
pub struct DeploymentManagerBuilder {
    settings: InstallationSettings,
    adapters: AdapterSet,
    firewall: Option<Arc<dyn FirewallBackend>>,
    data_dir: Option<std::path::PathBuf>,
}

impl DeploymentManagerBuilder {
    /// Use a custom adapter set
    pub fn adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    /// Use a firewall backend for deploy-time rules
    pub fn firewall(mut self, firewall: Arc<dyn FirewallBackend>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    /// Override the data directory root
    pub fn data_dir(mut self, data_dir: impl Into<std::path::PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Build the manager and its providers
    pub fn build(self) -> Result<DeploymentManager> {
        let root = self
            .data_dir
            .or_else(|| self.settings.data_dir.clone())
            .unwrap_or_else(DataDirs::default_root);
        let dirs = DataDirs::new(root);
        dirs.ensure()?;

        info!(
            installation = %self.settings.name,
            data_dir = %dirs.root().display(),
            "initializing deployment manager"
        );

        let bus = StateBus::new();
        let package_source = self.settings.blob_store.clone().map(|store| {
            Arc::new(BlobPackageSource::new(store, dirs.packages()))
        });

        let mut providers = HashMap::new();
        let mut order = Vec::new();
        for app in &self.settings.applications {
            if app.component_type == ComponentType::None {
                debug!(component = %app.name, "descriptor only, no provider");
                continue;
            }

            let adapter = self
                .adapters
                .find_for(app)
                .ok_or_else(|| Error::NoInstallerService(app.name.clone()))?;

            let mut provider =
                ComponentProvider::new(app.clone(), adapter, dirs.clone(), bus.clone());
            if let Some(source) = &package_source {
                provider = provider.with_package_source(source.clone());
            }
            if let Some(firewall) = &self.firewall {
                provider = provider.with_firewall(firewall.clone());
            }

            order.push(app.name.clone());
            providers.insert(app.name.clone(), Arc::new(provider));
        }

        Ok(DeploymentManager {
            settings: self.settings,
            providers,
            order,
            bus,
            dirs,
        })
    }
}

impl DeploymentManager {
    /// Start building a manager from effective installation settings
    pub fn builder(settings: InstallationSettings) -> DeploymentManagerBuilder {
        DeploymentManagerBuilder {
            settings,
            adapters: AdapterSet::with_defaults(),
            firewall: None,
            data_dir: None,
        }
    }

    /// Build a manager over a temporary data directory
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_tests(
        settings: InstallationSettings,
        adapters: AdapterSet,
    ) -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let data_dir = temp_dir.path().to_path_buf();

        // Keep the temp dir alive for the rest of the process.
        std::mem::forget(temp_dir);

        Self::builder(settings)
            .adapters(adapters)
            .data_dir(data_dir)
            .build()
    }

    /// The effective settings the manager was built from
    pub fn settings(&self) -> &InstallationSettings {
        &self.settings
    }

    /// The data directory tree
    pub fn dirs(&self) -> &DataDirs {
        &self.dirs
    }

    /// Component names in configuration order
    pub fn component_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Current state snapshot of one component
    pub fn state(&self, name: &str) -> Result<ComponentState> {
        Ok(self.provider(name)?.state())
    }

    /// Current dependent-component mirrors of one component
    pub fn dependents(&self, name: &str) -> Result<Vec<crate::state::DependentService>> {
        Ok(self.provider(name)?.dependents())
    }

    /// Current state snapshots of every component, in configuration order
    pub fn states(&self) -> Vec<(String, ComponentState)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.providers
                    .get(name)
                    .map(|p| (name.clone(), p.state()))
            })
            .collect()
    }

    /// Subscribe to state changes from every provider
    pub fn subscribe(&self) -> async_channel::Receiver<StateChange> {
        self.bus.subscribe()
    }

    /// Run one reconciliation pass over every component, sequentially
    pub async fn reconcile_all(&self) {
        for name in &self.order {
            if let Some(provider) = self.providers.get(name) {
                provider.reconcile().await;
            }
        }
    }

    /// Deploy a component's package
    pub async fn deploy(
        &self,
        name: &str,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Result<Outcome> {
        info!(component = name, "deploy requested");
        Ok(self.provider(name)?.deploy(timeout, cancel).await)
    }

    /// Start a component
    pub async fn start(
        &self,
        name: &str,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Result<Outcome> {
        info!(component = name, "start requested");
        Ok(self.provider(name)?.start(timeout, cancel).await)
    }

    /// Stop a component
    pub async fn stop(
        &self,
        name: &str,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Result<Outcome> {
        info!(component = name, "stop requested");
        Ok(self.provider(name)?.stop(timeout, cancel).await)
    }

    fn provider(&self, name: &str) -> Result<&Arc<ComponentProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))
    }
}

/// Background polling loop over a manager's providers
pub struct PollingLoop {
    manager: Arc<DeploymentManager>,
    interval: Duration,
}

impl PollingLoop {
    /// Create a loop using the settings' poll interval
    pub fn new(manager: Arc<DeploymentManager>) -> Self {
        let interval = Duration::from_secs(manager.settings.poll_interval_secs.max(1));
        Self { manager, interval }
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the cancel flag is raised.
    ///
    /// Every tick spawns a reconciliation pass for each non-busy provider
    /// and pumps bus notifications into dependent-component mirrors.
    pub async fn run(&self, cancel: &CancelFlag) {
        info!(interval = ?self.interval, "polling loop started");

        // Notification pump: every provider sees every peer's changes.
        let notifications = self.manager.bus.subscribe();
        let manager = self.manager.clone();
        let pump = smol::spawn(async move {
            while let Ok(change) = notifications.recv().await {
                for provider in manager.providers.values() {
                    provider.apply_notification(&change);
                }
            }
        });

        while !cancel.is_cancelled() {
            for provider in self.manager.providers.values() {
                if provider.is_busy() {
                    debug!(component = provider.name(), "busy, skipping this tick");
                    continue;
                }
                let provider = provider.clone();
                smol::spawn(async move { provider.reconcile().await }).detach();
            }

            smol::Timer::after(self.interval).await;
        }

        drop(pump);
        warn!("polling loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockInstaller;
    use deckhand_config::ApplicationOption;
    use std::collections::HashMap;

    fn settings_with(apps: Vec<ApplicationOption>) -> InstallationSettings {
        InstallationSettings {
            name: "test".to_string(),
            description: None,
            blob_store: None,
            defaults: HashMap::new(),
            poll_interval_secs: 3,
            data_dir: None,
            applications: apps,
        }
    }

    fn app(name: &str, component_type: ComponentType) -> ApplicationOption {
        ApplicationOption {
            name: name.to_string(),
            component_type,
            hosting_framework: Default::default(),
            install_path: None,
            main_file: None,
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

    #[test]
    fn test_none_components_get_no_provider() {
        let settings = settings_with(vec![
            app("managed", ComponentType::WindowsService),
            app("descriptor-only", ComponentType::None),
        ]);
        let adapters = AdapterSet::new().register(Arc::new(MockInstaller::new()));

        let manager = DeploymentManager::new_for_tests(settings, adapters).unwrap();
        assert_eq!(manager.component_names(), vec!["managed".to_string()]);
    }

    #[test]
    fn test_unknown_component_command_errors() {
        smol::block_on(async {
            let settings = settings_with(vec![]);
            let manager =
                DeploymentManager::new_for_tests(settings, AdapterSet::new()).unwrap();

            let result = manager
                .start("nope", Duration::from_secs(1), &CancelFlag::new())
                .await;
            assert!(matches!(result, Err(Error::ComponentNotFound(_))));
        });
    }

    #[test]
    fn test_missing_adapter_is_a_build_error() {
        let settings = settings_with(vec![app("site", ComponentType::InternetInformationService)]);
        let result = DeploymentManager::new_for_tests(settings, AdapterSet::new());
        assert!(matches!(result, Err(Error::NoInstallerService(_))));
    }

    #[test]
    fn test_adapter_set_dispatches_by_component_type() {
        let set = AdapterSet::with_defaults();
        let found = set.find_for(&app("db", ComponentType::PostgreSqlServer)).unwrap();
        assert_eq!(found.technology(), installer_services::Technology::Postgres);
        assert!(set.find_for(&app("x", ComponentType::None)).is_none());
    }
}
