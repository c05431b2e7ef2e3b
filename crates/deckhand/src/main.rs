use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Deckhand - on-premises component deployment orchestrator")]
#[command(version)]
struct Cli {
    /// Custom settings file
    #[arg(short, long, global = true, default_value = "custom.settings.json")]
    config: PathBuf,

    /// Template settings file merged under the custom settings
    #[arg(short, long, global = true, default_value = "template.settings.json")]
    template: PathBuf,

    /// Where the effective installation settings are written
    #[arg(long, global = true, default_value = "installation.settings.json")]
    effective_out: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the settings files
    Validate,

    /// Reconcile every component once and show the result
    Status {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Deploy a component's package
    Deploy {
        /// Component to deploy
        component: String,

        /// Timeout in seconds for native operations
        #[arg(short = 'T', long, default_value = "120")]
        timeout: u64,
    },

    /// Start a component
    Start {
        /// Component to start
        component: String,

        /// Timeout in seconds for native operations
        #[arg(short = 'T', long, default_value = "60")]
        timeout: u64,
    },

    /// Stop a component
    Stop {
        /// Component to stop
        component: String,

        /// Timeout in seconds for native operations
        #[arg(short = 'T', long, default_value = "60")]
        timeout: u64,
    },

    /// Run the polling loop and print state changes
    Watch,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    smol::block_on(async {
        let cli = Cli::parse();
        let paths = commands::SettingsPaths {
            custom: cli.config,
            template: cli.template,
            effective_out: cli.effective_out,
        };

        match cli.command {
            Commands::Validate => commands::validate::run(&paths).await,
            Commands::Status { format } => commands::status::run(&paths, &format).await,
            Commands::Deploy { component, timeout } => {
                commands::deploy::run(&paths, &component, timeout).await
            }
            Commands::Start { component, timeout } => {
                commands::start::run(&paths, &component, timeout).await
            }
            Commands::Stop { component, timeout } => {
                commands::stop::run(&paths, &component, timeout).await
            }
            Commands::Watch => commands::watch::run(&paths).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_paths_have_defaults() {
        let cli = Cli::parse_from(["deckhand", "validate"]);
        assert_eq!(cli.config, PathBuf::from("custom.settings.json"));
        assert_eq!(cli.template, PathBuf::from("template.settings.json"));
        assert_eq!(cli.effective_out, PathBuf::from("installation.settings.json"));
    }

    #[test]
    fn test_command_flags_parse() {
        let cli = Cli::parse_from(["deckhand", "deploy", "acme-site", "--timeout", "300"]);
        match cli.command {
            Commands::Deploy { component, timeout } => {
                assert_eq!(component, "acme-site");
                assert_eq!(timeout, 300);
            }
            _ => panic!("expected deploy command"),
        }
    }
}
