//! View root commands.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use iamgate_core::IamService;
use iamgate_core::config::Config;
use iamgate_core::identity::keycloak::KeycloakClient;
use iamgate_core::service::default_role_name;
use iamgate_tui::ViewOptions;

/// Builds the facade for the configured provider.
pub(crate) fn build_service(config: &Config) -> Result<IamService<KeycloakClient>> {
    let client = KeycloakClient::from_config(config)?;
    let options = config.init_options().context("resolve init options")?;
    Ok(IamService::new(client, options))
}

fn view_options(config: &Config) -> ViewOptions {
    ViewOptions {
        default_role: default_role_name(&config.provider.realm),
    }
}

/// Mounts the view root. Falls back to a single plain render when stdout is
/// not a terminal.
pub async fn run(config: &Config, plain: bool) -> Result<()> {
    if plain || !std::io::stdout().is_terminal() {
        return status(config).await;
    }

    let mut service = build_service(config)?;
    iamgate_tui::run(&mut service, &view_options(config)).await
}

pub async fn status(config: &Config) -> Result<()> {
    let mut service = build_service(config)?;
    let mut stdout = std::io::stdout().lock();
    let outcome = iamgate_tui::render_once(&mut service, &view_options(config), &mut stdout).await?;
    tracing::debug!(?outcome, "rendered view");
    Ok(())
}
