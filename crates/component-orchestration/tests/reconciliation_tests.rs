//! Integration tests for the reconciliation engine.
//!
//! All tests run against the mock installer service, so the only real
//! surfaces involved are the filesystem and the state bus.

use component_orchestration::testing::MockInstaller;
use component_orchestration::{
    AdapterSet, CancelFlag, DeploymentManager, InstallationState, RunningState,
};
use deckhand_config::{ApplicationOption, ComponentType, ConfigEdit, InstallationSettings};
use flate2::Compression;
use flate2::write::GzEncoder;
use installer_services::native::firewall::{FirewallBackend, MemoryFirewall};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn site_app(install_path: &Path) -> ApplicationOption {
    ApplicationOption {
        name: "acme-site".to_string(),
        component_type: ComponentType::WindowsService,
        hosting_framework: Default::default(),
        install_path: Some(install_path.to_path_buf()),
        main_file: Some("main.bin".to_string()),
        package: Some("acme-site.tar.gz".to_string()),
        dependent_components: vec![],
        dependent_services: vec![],
        settings: HashMap::new(),
        folder_permissions: vec![],
        firewall_rules: vec![deckhand_config::FirewallRuleOption {
            name: "ConsoleApp1".to_string(),
            port: 1234,
        }],
        config_edits: vec![ConfigEdit {
            file: "appsettings.json".to_string(),
            pointer: "/Logging/Level".to_string(),
            value: serde_json::json!("Warning"),
        }],
        endpoints: vec![],
    }
}

fn settings(apps: Vec<ApplicationOption>) -> InstallationSettings {
    InstallationSettings {
        name: "test-stack".to_string(),
        description: None,
        blob_store: None,
        defaults: HashMap::new(),
        poll_interval_secs: 3,
        data_dir: None,
        applications: apps,
    }
}

/// Build a package archive with a manifest, a main file, its version
/// sidecar and an editable config file
fn build_archive(dest_dir: &Path, name: &str, version: &str) {
    let stage = tempfile::tempdir().unwrap();
    std::fs::write(
        stage.path().join("version.json"),
        format!(r#"{{ "name": "{name}", "version": "{version}" }}"#),
    )
    .unwrap();
    std::fs::write(stage.path().join("main.bin"), b"payload").unwrap();
    std::fs::write(stage.path().join("main.bin.version"), version).unwrap();
    std::fs::write(
        stage.path().join("appsettings.json"),
        r#"{ "Logging": { "Level": "Information" } }"#,
    )
    .unwrap();

    std::fs::create_dir_all(dest_dir).unwrap();
    let file = File::create(dest_dir.join(format!("{name}.tar.gz"))).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", stage.path()).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

fn manager_with_mock(
    apps: Vec<ApplicationOption>,
    mock: Arc<MockInstaller>,
) -> DeploymentManager {
    let adapters = AdapterSet::new().register(mock);
    DeploymentManager::new_for_tests(settings(apps), adapters).unwrap()
}

#[test]
fn test_absent_package_is_no_installation_files() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let manager = manager_with_mock(
            vec![site_app(install.path())],
            Arc::new(MockInstaller::new()),
        );

        manager.reconcile_all().await;

        let state = manager.state("acme-site").unwrap();
        assert_eq!(state.installation, InstallationState::NoInstallationFiles);
        assert_eq!(state.running, RunningState::NotAvailable);
    });
}

#[test]
fn test_package_present_but_files_missing_is_not_installed() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockInstaller::new());
        // The adapter claims running; reconciliation must not believe it
        // while nothing is installed.
        mock.set_running(RunningState::Running);

        let manager = manager_with_mock(vec![site_app(install.path())], mock);
        build_archive(&manager.dirs().packages(), "acme-site", "1.0.0.0");

        manager.reconcile_all().await;

        let state = manager.state("acme-site").unwrap();
        assert_eq!(state.installation, InstallationState::NotInstalled);
        assert_eq!(state.running, RunningState::NotAvailable);
    });
}

#[test]
fn test_deploy_installs_starts_and_reports_newest() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockInstaller::new());
        let firewall = Arc::new(MemoryFirewall::new());

        let adapters = AdapterSet::new().register(mock.clone());
        let manager = DeploymentManager::builder(settings(vec![site_app(install.path())]))
            .adapters(adapters)
            .firewall(firewall.clone())
            .data_dir(tempfile::tempdir().unwrap().keep())
            .build()
            .unwrap();
        build_archive(&manager.dirs().packages(), "acme-site", "2.0.0.0");

        let outcome = manager
            .deploy("acme-site", TIMEOUT, &CancelFlag::new())
            .await
            .unwrap();
        assert!(outcome.succeeded, "deploy failed: {:?}", outcome.detail);

        // Files landed in the install path, the config edit was applied.
        assert!(install.path().join("main.bin").is_file());
        let config: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(install.path().join("appsettings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(config["Logging"]["Level"], "Warning");

        // The firewall rule was opened.
        assert!(firewall.rule_exists("ConsoleApp1").await);
        assert!(firewall.rule_enabled("ConsoleApp1").await);

        let state = manager.state("acme-site").unwrap();
        assert_eq!(
            state.installation,
            InstallationState::InstalledWithNewestVersion
        );
        assert_eq!(state.running, RunningState::Running);
        assert_eq!(state.installed_version.as_deref(), Some("2.0.0.0"));
        assert_eq!(state.package_version.as_deref(), Some("2.0.0.0"));
    });
}

#[test]
fn test_newer_package_marks_installed_old() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockInstaller::new());
        let manager = manager_with_mock(vec![site_app(install.path())], mock.clone());

        // Deploy 1.9.9.9 first.
        build_archive(&manager.dirs().packages(), "acme-site", "1.9.9.9");
        let outcome = manager
            .deploy("acme-site", TIMEOUT, &CancelFlag::new())
            .await
            .unwrap();
        assert!(outcome.succeeded);

        // A newer package arrives; the unpacked manifest now says 2.0.0.0.
        std::fs::write(
            manager
                .dirs()
                .unpacked_component("acme-site")
                .join("version.json"),
            r#"{ "name": "acme-site", "version": "2.0.0.0" }"#,
        )
        .unwrap();

        manager.reconcile_all().await;

        let state = manager.state("acme-site").unwrap();
        assert_eq!(
            state.installation,
            InstallationState::InstalledWithOldVersion
        );
        assert_eq!(state.installed_version.as_deref(), Some("1.9.9.9"));
        assert_eq!(state.package_version.as_deref(), Some("2.0.0.0"));
        // Still running: an old version keeps serving until redeployed.
        assert_eq!(state.running, RunningState::Running);
    });
}

#[test]
fn test_equal_versions_are_newest_not_old() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let manager = manager_with_mock(
            vec![site_app(install.path())],
            Arc::new(MockInstaller::new()),
        );

        build_archive(&manager.dirs().packages(), "acme-site", "3.1.0.0");
        manager
            .deploy("acme-site", TIMEOUT, &CancelFlag::new())
            .await
            .unwrap();
        manager.reconcile_all().await;

        let state = manager.state("acme-site").unwrap();
        assert_eq!(state.installed_version, state.package_version);
        assert_eq!(
            state.installation,
            InstallationState::InstalledWithNewestVersion
        );
    });
}

#[test]
fn test_start_is_gated_on_installation() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let manager = manager_with_mock(
            vec![site_app(install.path())],
            Arc::new(MockInstaller::new()),
        );
        build_archive(&manager.dirs().packages(), "acme-site", "1.0.0.0");

        let outcome = manager
            .start("acme-site", TIMEOUT, &CancelFlag::new())
            .await
            .unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.detail_text().contains("not installed"));
    });
}

#[test]
fn test_command_failure_surfaces_as_outcome() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockInstaller::new().with_start_failure("SCM said no"));
        let manager = manager_with_mock(vec![site_app(install.path())], mock);
        build_archive(&manager.dirs().packages(), "acme-site", "1.0.0.0");

        let outcome = manager
            .deploy("acme-site", TIMEOUT, &CancelFlag::new())
            .await
            .unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.detail_text(), "SCM said no");

        // The failed start leaves installed files behind; the state says so.
        let state = manager.state("acme-site").unwrap();
        assert_eq!(
            state.installation,
            InstallationState::InstalledWithNewestVersion
        );
        assert_eq!(state.running, RunningState::Stopped);
    });
}

#[test]
fn test_state_changes_reach_subscribers() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let manager = manager_with_mock(
            vec![site_app(install.path())],
            Arc::new(MockInstaller::new()),
        );
        build_archive(&manager.dirs().packages(), "acme-site", "1.0.0.0");

        let events = manager.subscribe();
        manager.reconcile_all().await;

        // Each pass publishes a checking snapshot and a final one.
        let first = events.recv().await.unwrap();
        assert_eq!(first.component, "acme-site");
        assert_eq!(first.installation, InstallationState::Checking);

        let second = events.recv().await.unwrap();
        assert_eq!(second.component, "acme-site");
        assert_eq!(second.installation, InstallationState::NotInstalled);
    });
}

#[test]
fn test_polling_loop_updates_dependent_mirrors() {
    smol::block_on(async {
        let install = tempfile::tempdir().unwrap();
        let mut viewer = site_app(install.path());
        viewer.name = "acme-viewer".to_string();
        viewer.package = None;
        viewer.dependent_components = vec!["acme-site".to_string()];

        let manager = Arc::new(manager_with_mock(
            vec![site_app(install.path()), viewer],
            Arc::new(MockInstaller::new()),
        ));
        build_archive(&manager.dirs().packages(), "acme-site", "1.0.0.0");

        let polling = component_orchestration::PollingLoop::new(manager.clone())
            .with_interval(Duration::from_millis(50));
        let cancel = CancelFlag::new();
        let loop_cancel = cancel.clone();
        let task = smol::spawn(async move { polling.run(&loop_cancel).await });

        // A few ticks are plenty for both components to publish.
        smol::Timer::after(Duration::from_millis(400)).await;
        cancel.cancel();
        task.await;

        // The mirror saw at least one notification; which snapshot it holds
        // depends on where the last pass was when the loop stopped.
        let mirrors = manager.dependents("acme-viewer").unwrap();
        assert_eq!(mirrors.len(), 1);
        assert_eq!(mirrors[0].name, "acme-site");
        assert_ne!(mirrors[0].installation, InstallationState::Unknown);
    });
}
