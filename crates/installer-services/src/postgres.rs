//! Installer service adapter for PostgreSQL servers.
//!
//! The install root comes from a fixed, ordered candidate list (registry
//! entry first, then well-known directories). Run state comes from
//! `pg_isready`; start and stop go through `pg_ctl`.

use crate::adapter::{
    CancelFlag, InstallerService, Outcome, RunningState, Technology, outcome_from_wait, wait_until,
};
use crate::native::registry::RegistryBackend;
use crate::probe::{env_candidate, first_existing};
use crate::tool::run_tool;
use async_trait::async_trait;
use deckhand_config::{ApplicationOption, ComponentType};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Registry key the PostgreSQL installer records its base directory under
const POSTGRES_REGISTRY_PATH: &str = r"SOFTWARE\PostgreSQL\Installations";
/// Registry value holding the base directory
const POSTGRES_BASE_DIRECTORY: &str = "Base Directory";

/// Adapter for PostgreSQL server instances
pub struct PostgresInstaller {
    registry: Option<Arc<dyn RegistryBackend>>,
    extra_roots: Vec<PathBuf>,
}

impl PostgresInstaller {
    /// Create an adapter probing only the well-known directories
    pub fn new() -> Self {
        Self {
            registry: None,
            extra_roots: Vec::new(),
        }
    }

    /// Create an adapter that consults a registry backend before probing
    /// directories
    pub fn with_registry(registry: Arc<dyn RegistryBackend>) -> Self {
        Self {
            registry: Some(registry),
            extra_roots: Vec::new(),
        }
    }

    /// Prepend candidate roots, ahead of the static list
    pub fn with_candidate_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.extra_roots = roots;
        self
    }

    /// Resolve the install root from the ordered candidate list
    pub fn install_root(&self, app: &ApplicationOption) -> Option<PathBuf> {
        let mut candidates = self.extra_roots.clone();

        if let Some(configured) = &app.install_path {
            candidates.push(configured.clone());
        }

        if let Some(registry) = &self.registry {
            if let Some(base) = registry.get_string(POSTGRES_REGISTRY_PATH, POSTGRES_BASE_DIRECTORY)
            {
                candidates.push(PathBuf::from(base));
            }
        }

        candidates.extend(env_candidate("ProgramFiles", "PostgreSQL"));
        candidates.push(PathBuf::from(r"C:\Program Files\PostgreSQL"));
        candidates.push(PathBuf::from("/usr/lib/postgresql"));
        candidates.push(PathBuf::from("/usr/local/pgsql"));

        first_existing(&candidates)
    }

    /// Data directory: the `data_directory` setting, or `data` under the
    /// install root
    fn data_directory(&self, app: &ApplicationOption) -> Option<PathBuf> {
        if let Some(dir) = app.settings.get("data_directory") {
            return Some(PathBuf::from(dir));
        }
        self.install_root(app).map(|root| root.join("data"))
    }

    fn bin_tool(&self, app: &ApplicationOption, tool: &str) -> PathBuf {
        match self.install_root(app) {
            Some(root) if root.join("bin").is_dir() => root.join("bin").join(tool),
            _ => PathBuf::from(tool),
        }
    }

    async fn probe_ready(&self, app: &ApplicationOption) -> RunningState {
        let pg_isready = self.bin_tool(app, "pg_isready");
        match run_tool(&pg_isready, Vec::<String>::new()).await {
            // 0: accepting, 1: starting up / rejecting, 2: unreachable
            Ok(out) => match out.code {
                Some(0) => RunningState::Running,
                Some(1) => RunningState::PartiallyRunning,
                Some(2) => RunningState::Stopped,
                _ => RunningState::Unknown,
            },
            Err(e) => {
                warn!(error = %e, "pg_isready probe failed");
                RunningState::Unknown
            }
        }
    }

    async fn pg_ctl(&self, app: &ApplicationOption, args: &[String]) -> Outcome {
        let pg_ctl = self.bin_tool(app, "pg_ctl");
        match run_tool(&pg_ctl, args.iter().cloned()).await {
            Ok(out) if out.success => Outcome::ok(),
            Ok(out) => Outcome::failed(format!("pg_ctl failed: {}", out.text().trim())),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}

impl Default for PostgresInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallerService for PostgresInstaller {
    fn technology(&self) -> Technology {
        Technology::Postgres
    }

    fn can_handle(&self, app: &ApplicationOption) -> bool {
        app.component_type == ComponentType::PostgreSqlServer
    }

    async fn is_installed(&self, app: &ApplicationOption) -> bool {
        self.install_root(app).is_some()
    }

    async fn running_state(&self, app: &ApplicationOption) -> RunningState {
        if self.install_root(app).is_none() {
            return RunningState::NotAvailable;
        }
        self.probe_ready(app).await
    }

    async fn installed_main_file(&self, app: &ApplicationOption) -> Option<PathBuf> {
        if let Some(path) = app.main_file_path().filter(|p| p.is_file()) {
            return Some(path);
        }
        // The server binary stands in when no main file is configured.
        let root = self.install_root(app)?;
        let candidates = [root.join("bin").join("postgres.exe"), root.join("bin").join("postgres")];
        candidates.into_iter().find(|p| p.is_file())
    }

    async fn start(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let Some(data_dir) = self.data_directory(app) else {
            return Outcome::failed(format!("Component '{}' has no data directory", app.name));
        };

        info!(data_dir = %data_dir.display(), "starting PostgreSQL");
        let outcome = self
            .pg_ctl(
                app,
                &[
                    "start".to_string(),
                    "-D".to_string(),
                    data_dir.display().to_string(),
                    "-w".to_string(),
                ],
            )
            .await;
        if !outcome.succeeded {
            return outcome;
        }

        let result = wait_until(timeout, cancel, || async {
            self.probe_ready(app).await == RunningState::Running
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
        let Some(data_dir) = self.data_directory(app) else {
            return Outcome::failed(format!("Component '{}' has no data directory", app.name));
        };

        if self.probe_ready(app).await == RunningState::Stopped {
            return Outcome::ok();
        }

        info!(data_dir = %data_dir.display(), "stopping PostgreSQL");
        let outcome = self
            .pg_ctl(
                app,
                &[
                    "stop".to_string(),
                    "-D".to_string(),
                    data_dir.display().to_string(),
                    "-m".to_string(),
                    "fast".to_string(),
                ],
            )
            .await;
        if !outcome.succeeded {
            return outcome;
        }

        let result = wait_until(timeout, cancel, || async {
            self.probe_ready(app).await == RunningState::Stopped
        })
        .await;
        outcome_from_wait(result, "stop", &app.name)
    }

    async fn create(
        &self,
        app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        let Some(data_dir) = self.data_directory(app) else {
            return Outcome::failed(format!("Component '{}' has no data directory", app.name));
        };
        if data_dir.join("PG_VERSION").is_file() {
            return Outcome::ok_with("Cluster already initialized");
        }

        info!(data_dir = %data_dir.display(), "initializing PostgreSQL cluster");
        self.pg_ctl(
            app,
            &[
                "initdb".to_string(),
                "-D".to_string(),
                data_dir.display().to_string(),
            ],
        )
        .await
    }

    async fn delete(
        &self,
        app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        Outcome::failed(format!(
            "Deleting PostgreSQL server '{}' is not supported",
            app.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::registry::MemoryRegistry;
    use std::collections::HashMap;

    fn postgres_app() -> ApplicationOption {
        ApplicationOption {
            name: "acme-db".to_string(),
            component_type: ComponentType::PostgreSqlServer,
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
    fn test_registry_entry_wins_over_static_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::with_values([(
            POSTGRES_REGISTRY_PATH,
            POSTGRES_BASE_DIRECTORY,
            dir.path().to_str().unwrap(),
        )]);

        let installer = PostgresInstaller::with_registry(Arc::new(registry));
        assert_eq!(
            installer.install_root(&postgres_app()),
            Some(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_configured_install_path_wins_over_registry() {
        let configured = tempfile::tempdir().unwrap();
        let from_registry = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::with_values([(
            POSTGRES_REGISTRY_PATH,
            POSTGRES_BASE_DIRECTORY,
            from_registry.path().to_str().unwrap(),
        )]);

        let mut app = postgres_app();
        app.install_path = Some(configured.path().to_path_buf());

        let installer = PostgresInstaller::with_registry(Arc::new(registry));
        assert_eq!(
            installer.install_root(&app),
            Some(configured.path().to_path_buf())
        );
    }

    #[test]
    fn test_data_directory_setting_override() {
        let mut app = postgres_app();
        app.settings
            .insert("data_directory".to_string(), "/var/lib/pg/data".to_string());

        let installer = PostgresInstaller::new();
        assert_eq!(
            installer.data_directory(&app),
            Some(PathBuf::from("/var/lib/pg/data"))
        );
    }

    #[smol_potat::test]
    async fn test_no_root_means_not_available() {
        let installer = PostgresInstaller::new().with_candidate_roots(vec![]);
        let app = postgres_app();
        // Only meaningful on machines without a real PostgreSQL install root;
        // with one present the adapter legitimately reports a probe result.
        if installer.install_root(&app).is_none() {
            assert_eq!(
                installer.running_state(&app).await,
                RunningState::NotAvailable
            );
        }
    }
}
