use super::SettingsPaths;
use anyhow::Result;
use component_orchestration::CancelFlag;
use std::time::Duration;

pub async fn run(paths: &SettingsPaths, component: &str, timeout: u64) -> Result<()> {
    let settings = super::load_settings(paths)?;
    let manager = super::build_manager(settings)?;

    let outcome = manager
        .deploy(component, Duration::from_secs(timeout), &CancelFlag::new())
        .await?;
    super::report_outcome("deploy", component, &outcome)
}
