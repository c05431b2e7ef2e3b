use super::SettingsPaths;
use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use component_orchestration::{ComponentState, InstallationState, RunningState};

pub async fn run(paths: &SettingsPaths, format: &str) -> Result<()> {
    if format != "table" && format != "json" {
        anyhow::bail!("Invalid format: {}. Must be 'table' or 'json'", format);
    }

    let settings = super::load_settings(paths)?;
    let manager = super::build_manager(settings)?;

    manager.reconcile_all().await;
    let states = manager.states();

    if format == "json" {
        let map: serde_json::Map<String, serde_json::Value> = states
            .into_iter()
            .map(|(name, state)| (name, serde_json::to_value(state).unwrap_or_default()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Component",
        "Type",
        "Installation",
        "Running",
        "Installed",
        "Package",
    ]);

    for (name, state) in states {
        let component_type = manager
            .settings()
            .application(&name)
            .map(|app| format!("{:?}", app.component_type))
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(&name),
            Cell::new(component_type),
            installation_cell(&state),
            running_cell(&state),
            Cell::new(state.installed_version.as_deref().unwrap_or("-")),
            Cell::new(state.package_version.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn installation_cell(state: &ComponentState) -> Cell {
    let cell = Cell::new(format!("{:?}", state.installation));
    match state.installation {
        InstallationState::InstalledWithNewestVersion => cell.fg(Color::Green),
        InstallationState::InstalledWithOldVersion => cell.fg(Color::Yellow),
        InstallationState::NotInstalled | InstallationState::NoInstallationFiles => {
            cell.fg(Color::Red)
        }
        _ => cell,
    }
}

fn running_cell(state: &ComponentState) -> Cell {
    let cell = Cell::new(format!("{:?}", state.running));
    match state.running {
        RunningState::Running => cell.fg(Color::Green),
        RunningState::PartiallyRunning => cell.fg(Color::Yellow),
        RunningState::Stopped => cell.fg(Color::Red),
        _ => cell,
    }
}
