//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use iamgate_core::config::{self, Config};
use iamgate_core::interrupt;
use tracing_appender::non_blocking::WorkerGuard;

use crate::logging;

mod commands;

#[derive(Parser)]
#[command(name = "iamgate")]
#[command(version)]
#[command(about = "Sign in to a Keycloak realm from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print the view once as plain text instead of running the interactive view
    #[arg(long, global = true)]
    plain: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show the current sign-in state
    Status,

    /// Sign in with the identity provider
    Login,

    /// Sign out and forget the cached session
    Logout,

    /// Refresh the access token if it is about to expire
    Refresh,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    interrupt::init().context("install Ctrl+C handler")?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        None => {
            let (config, _guard) = load_config()?;
            commands::app::run(&config, cli.plain).await
        }
        Some(Commands::Status) => {
            let (config, _guard) = load_config()?;
            commands::app::status(&config).await
        }
        Some(Commands::Login) => {
            let (config, _guard) = load_config()?;
            commands::auth::login(&config).await
        }
        Some(Commands::Logout) => {
            let (config, _guard) = load_config()?;
            commands::auth::logout(&config).await
        }
        Some(Commands::Refresh) => {
            let (config, _guard) = load_config()?;
            commands::auth::refresh(&config).await
        }
        Some(Commands::Config { command }) => {
            let _guard = logging::init(None)?;
            match command {
                ConfigCommands::Path => {
                    commands::config::path();
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(),
            }
        }
    }
}

/// Loads the config and installs logging as it asks.
fn load_config() -> Result<(Config, Option<WorkerGuard>)> {
    let config = Config::load().context("load config")?;
    let guard = logging::init(config.log_file.as_deref())?;
    tracing::debug!(path = %config::paths::config_path().display(), "config loaded");
    Ok((config, guard))
}
