//! Integration tests for deckhand-config

use deckhand_config::{
    ComponentType, ConfigError, HostingFramework, load_effective, load_file,
    resolver::{ResolutionContext, resolve_placeholders},
};
use std::fs;

const TEMPLATE: &str = r#"{
    "name": "acme-template",
    "blob_store": {
        "account_url": "https://acme.blob.core.windows.net",
        "container": "releases"
    },
    "defaults": {
        "DB_HOST": "localhost",
        "DB_PORT": "5432"
    },
    "applications": [
        {
            "name": "acme-site",
            "component_type": "internet_information_service",
            "hosting_framework": "net8",
            "install_path": "/srv/acme-site",
            "main_file": "AcmeSite.dll",
            "package": "acme-site.tar.gz",
            "settings": {
                "ConnectionString": "Host=${DB_HOST};Port=${DB_PORT}"
            },
            "firewall_rules": [
                { "name": "AcmeSite", "port": 443 }
            ],
            "endpoints": [
                { "name": "http", "url": "https://localhost/acme" }
            ]
        },
        {
            "name": "acme-worker",
            "component_type": "windows_service",
            "hosting_framework": "net_framework48",
            "install_path": "/srv/acme-worker",
            "main_file": "AcmeWorker.exe",
            "package": "acme-worker.tar.gz",
            "dependent_components": ["acme-site"]
        }
    ]
}"#;

const CUSTOM: &str = r#"{
    "name": "acme-production",
    "poll_interval_secs": 5,
    "defaults": {
        "DB_HOST": "db01.acme.internal"
    },
    "applications": [
        {
            "name": "acme-site",
            "install_path": "/srv/prod/acme-site"
        }
    ]
}"#;

#[test]
fn test_load_effective_merges_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let custom_path = dir.path().join("custom.settings.json");
    let template_path = dir.path().join("template.settings.json");
    let effective_path = dir.path().join("installation.settings.json");

    fs::write(&custom_path, CUSTOM).unwrap();
    fs::write(&template_path, TEMPLATE).unwrap();

    let settings = load_effective(&custom_path, &template_path, &effective_path).unwrap();

    assert_eq!(settings.name, "acme-production");
    assert_eq!(settings.poll_interval_secs, 5);
    // Template-only fields survive the merge
    assert_eq!(
        settings.blob_store.as_ref().unwrap().container,
        "releases"
    );
    // Custom defaults override template defaults key by key
    assert_eq!(settings.defaults["DB_HOST"], "db01.acme.internal");
    assert_eq!(settings.defaults["DB_PORT"], "5432");

    // Applications merge by name: the custom install path wins, the rest of
    // the template entry survives.
    let site = settings.application("acme-site").unwrap();
    assert_eq!(
        site.install_path.as_deref().unwrap().to_str().unwrap(),
        "/srv/prod/acme-site"
    );
    assert_eq!(site.main_file.as_deref(), Some("AcmeSite.dll"));
    assert_eq!(
        site.component_type,
        ComponentType::InternetInformationService
    );

    // The effective document on disk parses back to the same settings
    let reloaded = load_file(&effective_path).unwrap();
    assert_eq!(reloaded, settings);
}

#[test]
fn test_resolve_placeholders_against_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let custom_path = dir.path().join("custom.settings.json");
    let template_path = dir.path().join("template.settings.json");
    let effective_path = dir.path().join("installation.settings.json");

    fs::write(&custom_path, CUSTOM).unwrap();
    fs::write(&template_path, TEMPLATE).unwrap();

    let settings = load_effective(&custom_path, &template_path, &effective_path).unwrap();
    let context = ResolutionContext::from_settings(&settings);
    let resolved = resolve_placeholders(&settings, &context).unwrap();

    let site = resolved.application("acme-site").unwrap();
    assert_eq!(
        site.settings["ConnectionString"],
        "Host=db01.acme.internal;Port=5432"
    );
}

#[test]
fn test_unresolved_placeholder_is_an_error() {
    let json = r#"{
        "name": "broken",
        "applications": [
            {
                "name": "app",
                "component_type": "application",
                "settings": { "Key": "${NOT_A_REAL_SETTING_ANYWHERE}" }
            }
        ]
    }"#;

    let settings: deckhand_config::InstallationSettings = serde_json::from_str(json).unwrap();
    let context = ResolutionContext::from_settings(&settings);
    let err = resolve_placeholders(&settings, &context).unwrap_err();
    assert!(matches!(err, ConfigError::PlaceholderNotFound(_)));
}

#[test]
fn test_bad_json_surfaces_as_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.settings.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(load_file(&path), Err(ConfigError::JsonError(_))));
}

#[test]
fn test_hosting_framework_tags() {
    let json = r#"{ "name": "app", "hosting_framework": "node_js" }"#;
    let app: deckhand_config::ApplicationOption = serde_json::from_str(json).unwrap();
    assert_eq!(app.hosting_framework, HostingFramework::NodeJs);
}
