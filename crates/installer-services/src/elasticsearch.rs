//! Installer service adapter for Elasticsearch nodes.
//!
//! Running state comes from the cluster health endpoint; green and yellow
//! count as running, red as partially running, connection refused as
//! stopped. Start spawns the distribution's startup script.

use crate::adapter::{
    CancelFlag, InstallerService, Outcome, RunningState, Technology, outcome_from_wait, wait_until,
};
use crate::probe::{env_candidate, first_existing};
use crate::tool::spawn_detached;
use async_trait::async_trait;
use deckhand_config::{ApplicationOption, ComponentType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default cluster health endpoint probed when the component declares none
pub const DEFAULT_HEALTH_URL: &str = "http://localhost:9200/_cluster/health";

/// Adapter for Elasticsearch nodes
pub struct ElasticsearchInstaller {
    extra_roots: Vec<PathBuf>,
}

impl ElasticsearchInstaller {
    /// Create an adapter probing the well-known directories
    pub fn new() -> Self {
        Self {
            extra_roots: Vec::new(),
        }
    }

    /// Prepend candidate roots, ahead of the static list
    pub fn with_candidate_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.extra_roots = roots;
        self
    }

    /// Health endpoint: the component's `health` endpoint when declared,
    /// the localhost default otherwise.
    pub fn health_url(app: &ApplicationOption) -> String {
        app.endpoints
            .iter()
            .find(|e| e.name == "health")
            .map(|e| e.url.clone())
            .unwrap_or_else(|| DEFAULT_HEALTH_URL.to_string())
    }

    /// Resolve the install root from the ordered candidate list
    pub fn install_root(&self, app: &ApplicationOption) -> Option<PathBuf> {
        let mut candidates = self.extra_roots.clone();

        if let Some(configured) = &app.install_path {
            candidates.push(configured.clone());
        }

        candidates.extend(env_candidate("ProgramFiles", "Elastic/Elasticsearch"));
        candidates.push(PathBuf::from(r"C:\Program Files\Elastic\Elasticsearch"));
        candidates.push(PathBuf::from("/usr/share/elasticsearch"));
        candidates.push(PathBuf::from("/opt/elasticsearch"));

        first_existing(&candidates)
    }

    async fn probe_health(&self, app: &ApplicationOption) -> RunningState {
        let url = Self::health_url(app);
        let response = smol::unblock(move || {
            reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .and_then(|client| client.get(&url).send())
                .and_then(|resp| resp.json::<serde_json::Value>())
        })
        .await;

        match response {
            Ok(body) => match body.get("status").and_then(|s| s.as_str()) {
                Some("green") | Some("yellow") => RunningState::Running,
                Some("red") => RunningState::PartiallyRunning,
                _ => RunningState::Unknown,
            },
            Err(e) if e.is_connect() => RunningState::Stopped,
            Err(e) => {
                warn!(error = %e, "cluster health probe failed");
                RunningState::Unknown
            }
        }
    }

    fn startup_script(&self, app: &ApplicationOption) -> Option<PathBuf> {
        let root = self.install_root(app)?;
        let candidates = [
            root.join("bin").join("elasticsearch.bat"),
            root.join("bin").join("elasticsearch"),
        ];
        candidates.into_iter().find(|p| p.is_file())
    }
}

impl Default for ElasticsearchInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallerService for ElasticsearchInstaller {
    fn technology(&self) -> Technology {
        Technology::Elasticsearch
    }

    fn can_handle(&self, app: &ApplicationOption) -> bool {
        app.component_type == ComponentType::Elasticsearch
    }

    async fn is_installed(&self, app: &ApplicationOption) -> bool {
        self.install_root(app).is_some()
    }

    async fn running_state(&self, app: &ApplicationOption) -> RunningState {
        if self.install_root(app).is_none() {
            return RunningState::NotAvailable;
        }
        self.probe_health(app).await
    }

    async fn installed_main_file(&self, app: &ApplicationOption) -> Option<PathBuf> {
        if let Some(path) = app.main_file_path().filter(|p| p.is_file()) {
            return Some(path);
        }
        self.startup_script(app)
    }

    async fn start(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        let Some(script) = self.startup_script(app) else {
            return Outcome::failed(format!(
                "Component '{}' has no Elasticsearch startup script",
                app.name
            ));
        };

        info!(script = %script.display(), "starting Elasticsearch");
        if let Err(e) = spawn_detached(&script, ["-d"]) {
            return Outcome::failed(e.to_string());
        }

        let result = wait_until(timeout, cancel, || async {
            self.probe_health(app).await == RunningState::Running
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
        if self.probe_health(app).await == RunningState::Stopped {
            return Outcome::ok();
        }

        info!("stopping Elasticsearch");
        let kill = if cfg!(windows) {
            crate::tool::run_tool("taskkill", ["/F", "/IM", "java.exe"]).await
        } else {
            crate::tool::run_tool("pkill", ["-f", "org.elasticsearch.bootstrap"]).await
        };
        if let Err(e) = kill {
            return Outcome::failed(e.to_string());
        }

        let result = wait_until(timeout, cancel, || async {
            self.probe_health(app).await == RunningState::Stopped
        })
        .await;
        outcome_from_wait(result, "stop", &app.name)
    }

    async fn create(
        &self,
        _app: &ApplicationOption,
        _timeout: Duration,
        _cancel: &CancelFlag,
    ) -> Outcome {
        // The distribution is self-contained; unpacking it is the install.
        Outcome::ok()
    }

    async fn delete(
        &self,
        app: &ApplicationOption,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Outcome {
        self.stop(app, timeout, cancel).await
    }
}
