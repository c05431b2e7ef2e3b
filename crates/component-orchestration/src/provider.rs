//! Component provider: the per-component state engine.
//!
//! A provider owns one configured application's lifecycle. Each
//! reconciliation pass recomputes both state axes from the filesystem and
//! the installer service adapter, then publishes the snapshot on the bus.
//! Deploy, start and stop are busy-guarded commands layered on the same
//! adapter; a failure is reported as an [`Outcome`], logged, and never
//! propagated as an error into the polling loop.

use crate::events::{StateBus, StateChange};
use crate::fsops::{apply_config_edits, backup_dir, copy_dir_recursive};
use crate::package::{read_manifest, unpack_package};
use crate::paths::DataDirs;
use crate::state::{ComponentState, DependentService, InstallationState};
use crate::version;
use chrono::Utc;
use deckhand_config::ApplicationOption;
use installer_services::native::firewall::{FirewallBackend, RULE_ALREADY_EXIST};
use installer_services::tool::run_tool;
use installer_services::{BlobPackageSource, CancelFlag, InstallerService, Outcome, RunningState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// State engine for one configured component
pub struct ComponentProvider {
    app: ApplicationOption,
    adapter: Arc<dyn InstallerService>,
    package_source: Option<Arc<BlobPackageSource>>,
    firewall: Option<Arc<dyn FirewallBackend>>,
    dirs: DataDirs,
    bus: StateBus,
    state: RwLock<ComponentState>,
    dependents: RwLock<Vec<DependentService>>,
    busy: AtomicBool,
}

/// Clears the busy flag when a pass or command finishes
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ComponentProvider {
    /// Create a provider for one application descriptor
    pub fn new(
        app: ApplicationOption,
        adapter: Arc<dyn InstallerService>,
        dirs: DataDirs,
        bus: StateBus,
    ) -> Self {
        let dependents = app
            .dependent_components
            .iter()
            .map(DependentService::new)
            .collect();

        Self {
            app,
            adapter,
            package_source: None,
            firewall: None,
            dirs,
            bus,
            state: RwLock::new(ComponentState::default()),
            dependents: RwLock::new(dependents),
            busy: AtomicBool::new(false),
        }
    }

    /// Attach a package source for deploys
    pub fn with_package_source(mut self, source: Arc<BlobPackageSource>) -> Self {
        self.package_source = Some(source);
        self
    }

    /// Attach a firewall backend for deploy-time rules
    pub fn with_firewall(mut self, firewall: Arc<dyn FirewallBackend>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.app.name
    }

    /// The application descriptor this provider manages
    pub fn descriptor(&self) -> &ApplicationOption {
        &self.app
    }

    /// Current state snapshot
    pub fn state(&self) -> ComponentState {
        self.state.read().unwrap().clone()
    }

    /// Current dependent-component mirrors
    pub fn dependents(&self) -> Vec<DependentService> {
        self.dependents.read().unwrap().clone()
    }

    /// Whether a pass or command is currently running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(BusyGuard(&self.busy))
    }

    fn busy_outcome(&self) -> Outcome {
        Outcome::failed(format!("Component '{}' is busy", self.app.name))
    }

    fn set_and_publish(&self, state: ComponentState) {
        *self.state.write().unwrap() = state.clone();
        self.bus
            .publish(StateChange::from_state(&self.app.name, &state));
    }

    /// Apply an inbound notification to any matching dependent mirror
    pub fn apply_notification(&self, change: &StateChange) {
        let mut dependents = self.dependents.write().unwrap();
        for mirror in dependents.iter_mut().filter(|d| d.name == change.component) {
            mirror.installation = change.installation;
            mirror.running = change.running;
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Skipped silently when the provider is busy; the next poll tick picks
    /// it up again.
    pub async fn reconcile(&self) {
        let Some(_guard) = self.begin() else {
            debug!(component = %self.app.name, "skipping pass, provider is busy");
            return;
        };

        self.set_and_publish(ComponentState::checking());
        let state = self.compute_state().await;
        self.set_and_publish(state);
    }

    /// Recompute both state axes without touching the busy flag
    async fn compute_state(&self) -> ComponentState {
        let mut package_version = None;

        if let Some(package) = &self.app.package {
            let unpacked = self.dirs.unpacked_component(&self.app.name);
            if unpacked.is_dir() {
                package_version = read_manifest(&unpacked).ok().map(|m| m.version);
            } else if !self.dirs.packages().join(package).is_file() {
                return ComponentState {
                    installation: InstallationState::NoInstallationFiles,
                    running: RunningState::NotAvailable,
                    installed_version: None,
                    package_version: None,
                    changed_at: Some(Utc::now()),
                };
            }
        }

        let Some(main_file) = self.adapter.installed_main_file(&self.app).await else {
            return ComponentState {
                installation: InstallationState::NotInstalled,
                running: RunningState::NotAvailable,
                installed_version: None,
                package_version,
                changed_at: Some(Utc::now()),
            };
        };

        let installed_version =
            version::installed_version(&main_file, self.app.hosting_framework).await;

        // Equal versions are already-installed; only a strictly newer
        // package downgrades the state.
        let installation = match (&installed_version, &package_version) {
            (Some(installed), Some(package))
                if version::FileVersion::new(package.clone()).is_newer_than(installed) =>
            {
                InstallationState::InstalledWithOldVersion
            }
            _ => InstallationState::InstalledWithNewestVersion,
        };

        // The running axis is whatever the adapter reports, never more.
        let running = self.adapter.running_state(&self.app).await;

        ComponentState {
            installation,
            running,
            installed_version: installed_version.map(|v| v.as_str().to_string()),
            package_version,
            changed_at: Some(Utc::now()),
        }
    }

    /// Deploy the configured package: download, unpack, verify, stop, back
    /// up, copy, edit configs, open firewall rules, register and start.
    pub async fn deploy(&self, timeout: Duration, cancel: &CancelFlag) -> Outcome {
        let Some(_guard) = self.begin() else {
            return self.busy_outcome();
        };

        let Some(package) = self.app.package.clone() else {
            return Outcome::failed(format!(
                "Component '{}' has no package configured",
                self.app.name
            ));
        };

        let archive = match self.locate_archive(&package).await {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };

        let mut state = self.state();
        state.installation = InstallationState::Installing;
        state.running = RunningState::NotAvailable;
        state.changed_at = Some(Utc::now());
        self.set_and_publish(state);

        let outcome = self.run_deploy(&archive, timeout, cancel).await;
        if !outcome.succeeded {
            warn!(
                component = %self.app.name,
                detail = outcome.detail_text(),
                "deploy failed"
            );
        }

        let state = self.compute_state().await;
        self.set_and_publish(state);
        outcome
    }

    async fn locate_archive(&self, package: &str) -> std::result::Result<PathBuf, Outcome> {
        if let Some(source) = &self.package_source {
            return source.fetch(package).await.map_err(|e| {
                Outcome::failed(format!("Package download failed: {e}"))
            });
        }

        let local = self.dirs.packages().join(package);
        if local.is_file() {
            Ok(local)
        } else {
            Err(Outcome::failed(format!(
                "No installation files for '{}': {} is missing",
                self.app.name,
                local.display()
            )))
        }
    }

    async fn run_deploy(&self, archive: &Path, timeout: Duration, cancel: &CancelFlag) -> Outcome {
        let unpacked = self.dirs.unpacked_component(&self.app.name);
        let manifest = match unpack_package(archive, &unpacked, &self.app.name) {
            Ok(manifest) => manifest,
            Err(e) => return Outcome::failed(e.to_string()),
        };

        let Some(install_path) = self.app.install_path.clone() else {
            return Outcome::failed(format!(
                "Component '{}' has no install path",
                self.app.name
            ));
        };

        match self.adapter.running_state(&self.app).await {
            RunningState::Running | RunningState::PartiallyRunning => {
                let stop = self.adapter.stop(&self.app, timeout, cancel).await;
                if !stop.succeeded {
                    return stop;
                }
            }
            _ => {}
        }

        let previous_version = match self.adapter.installed_main_file(&self.app).await {
            Some(main) => version::installed_version(&main, self.app.hosting_framework)
                .await
                .map(|v| v.as_str().to_string()),
            None => None,
        };
        if let Err(e) = backup_dir(
            &install_path,
            &self.dirs.backups(),
            &self.app.name,
            previous_version.as_deref(),
        ) {
            return Outcome::failed(format!("Backup failed: {e}"));
        }

        if let Err(e) = copy_dir_recursive(&unpacked, &install_path) {
            return Outcome::failed(format!("Copying installation files failed: {e}"));
        }

        if let Err(e) = apply_config_edits(&self.app, &install_path) {
            return Outcome::failed(e.to_string());
        }

        let permissions = self.apply_folder_permissions().await;
        if !permissions.succeeded {
            return permissions;
        }

        let firewall = self.apply_firewall_rules().await;
        if !firewall.succeeded {
            return firewall;
        }

        let create = self.adapter.create(&self.app, timeout, cancel).await;
        if !create.succeeded {
            return create;
        }
        let start = self.adapter.start(&self.app, timeout, cancel).await;
        if !start.succeeded {
            return start;
        }

        info!(
            component = %self.app.name,
            version = %manifest.version,
            "deploy finished"
        );
        Outcome::ok_with(format!("Deployed version {}", manifest.version))
    }

    async fn apply_firewall_rules(&self) -> Outcome {
        let Some(firewall) = &self.firewall else {
            return Outcome::ok();
        };

        for rule in &self.app.firewall_rules {
            let outcome = firewall.add_inbound_tcp_rule(&rule.name, rule.port).await;
            // A rule left over from a previous deploy is fine.
            if !outcome.succeeded && outcome.detail_text() != RULE_ALREADY_EXIST {
                return Outcome::failed(format!(
                    "Firewall rule '{}' failed: {}",
                    rule.name,
                    outcome.detail_text()
                ));
            }
        }
        Outcome::ok()
    }

    async fn apply_folder_permissions(&self) -> Outcome {
        if self.app.folder_permissions.is_empty() {
            return Outcome::ok();
        }
        if !cfg!(windows) {
            debug!(component = %self.app.name, "folder permissions skipped off Windows");
            return Outcome::ok();
        }

        for permission in &self.app.folder_permissions {
            let grant = format!("{}:{}", permission.account, right_flag(&permission.right));
            let result = run_tool(
                "icacls",
                [
                    permission.path.display().to_string(),
                    "/grant".to_string(),
                    grant,
                ],
            )
            .await;
            match result {
                Ok(out) if out.success => {}
                Ok(out) => {
                    return Outcome::failed(format!(
                        "icacls on {} failed: {}",
                        permission.path.display(),
                        out.text().trim()
                    ));
                }
                Err(e) => return Outcome::failed(e.to_string()),
            }
        }
        Outcome::ok()
    }

    /// Start the component, gated on its installation state
    pub async fn start(&self, timeout: Duration, cancel: &CancelFlag) -> Outcome {
        let Some(_guard) = self.begin() else {
            return self.busy_outcome();
        };

        let state = self.compute_state().await;
        self.set_and_publish(state.clone());
        if !state.installation.is_installed() {
            return Outcome::failed(format!(
                "Component '{}' is not installed ({:?})",
                self.app.name, state.installation
            ));
        }

        let outcome = self.adapter.start(&self.app, timeout, cancel).await;
        if !outcome.succeeded {
            warn!(
                component = %self.app.name,
                detail = outcome.detail_text(),
                "start failed"
            );
        }

        let state = self.compute_state().await;
        self.set_and_publish(state);
        outcome
    }

    /// Stop the component
    pub async fn stop(&self, timeout: Duration, cancel: &CancelFlag) -> Outcome {
        let Some(_guard) = self.begin() else {
            return self.busy_outcome();
        };

        let outcome = self.adapter.stop(&self.app, timeout, cancel).await;
        if !outcome.succeeded {
            warn!(
                component = %self.app.name,
                detail = outcome.detail_text(),
                "stop failed"
            );
        }

        let state = self.compute_state().await;
        self.set_and_publish(state);
        outcome
    }
}

fn right_flag(right: &str) -> &str {
    match right {
        "read" => "RX",
        "modify" => "M",
        "full" => "F",
        other => other,
    }
}
