use super::SettingsPaths;
use anyhow::Result;

pub async fn run(paths: &SettingsPaths) -> Result<()> {
    let settings = super::load_settings(paths)?;

    println!("Configuration is valid");
    println!("  Installation: {}", settings.name);
    println!("  Applications: {}", settings.applications.len());
    for app in &settings.applications {
        println!("    {} ({:?})", app.name, app.component_type);
    }
    if paths.template.is_file() {
        println!(
            "  Effective settings written to {}",
            paths.effective_out.display()
        );
    }
    Ok(())
}
