//! Session command handlers.

use anyhow::Result;
use iamgate_core::RefreshOutcome;
use iamgate_core::config::{Config, paths};

use super::app::build_service;

pub async fn login(config: &Config) -> Result<()> {
    let mut service = build_service(config)?;
    service.login().await?;

    let name = service.display_name().unwrap_or("unknown user");
    println!("✓ Signed in as {name}");
    println!("  Session saved to {}", paths::session_path().display());
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let mut service = build_service(config)?;
    service.initialize().await;

    // a cached entry may survive a handshake that could not reach the provider
    let cached = matches!(service.client().session_store().load(), Ok(Some(_)));
    let had_session = service.is_authenticated() || cached;

    service.logout().await?;
    if had_session {
        println!("✓ Logged out");
    } else {
        println!("Not logged in (no session found).");
    }
    Ok(())
}

pub async fn refresh(config: &Config) -> Result<()> {
    let mut service = build_service(config)?;
    service.initialize().await;

    let outcome = service
        .refresh(|refreshed| tracing::debug!(refreshed, "token update finished"))
        .await;
    match outcome {
        RefreshOutcome::Refreshed => println!("Token refreshed"),
        RefreshOutcome::StillValid => println!("Token still valid"),
        RefreshOutcome::LoginTriggered if service.is_authenticated() => {
            println!("Refresh failed; new login completed");
        }
        RefreshOutcome::LoginTriggered => println!("Refresh failed; new login did not complete"),
    }
    Ok(())
}
