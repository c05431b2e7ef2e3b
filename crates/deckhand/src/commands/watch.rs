use super::SettingsPaths;
use anyhow::Result;
use component_orchestration::{CancelFlag, PollingLoop};
use std::sync::Arc;

pub async fn run(paths: &SettingsPaths) -> Result<()> {
    let settings = super::load_settings(paths)?;
    let manager = Arc::new(super::build_manager(settings)?);

    println!("Watching component state - Press Ctrl+C to exit\n");

    let events = manager.subscribe();
    let polling = PollingLoop::new(manager);
    let cancel = CancelFlag::new();
    let task = smol::spawn(async move { polling.run(&cancel).await });

    while let Ok(change) = events.recv().await {
        println!(
            "{}  {:<24} {:?}/{:?}",
            change.timestamp.format("%H:%M:%S"),
            change.component,
            change.installation,
            change.running
        );
    }

    task.await;
    Ok(())
}
