//! Identity provider client.
//!
//! The facade in [`crate::service`] only talks to the provider through the
//! [`IdentityClient`] trait. [`KeycloakClient`] is the production
//! implementation; tests substitute a fake.

pub mod callback;
pub mod keycloak;
pub mod pkce;
pub mod store;
pub mod token;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

pub use keycloak::KeycloakClient;
pub use token::TokenClaims;

/// What the handshake does on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnLoad {
    /// Restore an existing provider session without user interaction.
    #[default]
    CheckSso,
    /// Start an interactive login when no session exists.
    LoginRequired,
}

impl OnLoad {
    pub fn as_str(self) -> &'static str {
        match self {
            OnLoad::CheckSso => "check-sso",
            OnLoad::LoginRequired => "login-required",
        }
    }
}

/// Proof-key challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PkceMethod {
    #[default]
    S256,
}

impl PkceMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
        }
    }
}

/// Options for the one-time provider handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub on_load: OnLoad,
    /// Redirect target used by the silent SSO check
    pub silent_check_sso_redirect_uri: Url,
    pub pkce_method: PkceMethod,
    /// Whether the silent check may open a browser when nothing is cached
    pub silent_check_sso_browser: bool,
}

/// Capability set of an identity provider client.
///
/// The session token lives inside the implementation; callers only read it
/// through [`token`](Self::token) and [`token_parsed`](Self::token_parsed).
pub trait IdentityClient: Send {
    /// Performs the provider handshake. Resolves to whether a session exists.
    fn init(&mut self, options: &InitOptions) -> impl Future<Output = Result<bool>> + Send;

    /// Runs the interactive login and installs the resulting token.
    fn login(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Ends the provider session and drops the token.
    fn logout(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Refreshes the token if it expires within `min_validity`.
    /// Resolves to `true` when a refresh actually happened.
    fn update_token(
        &mut self,
        min_validity: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Raw access token, if a session exists.
    fn token(&self) -> Option<&str>;

    /// Parsed claims of the access token, if a session exists.
    fn token_parsed(&self) -> Option<&TokenClaims>;

    /// Whether the token carries the given realm role.
    fn has_realm_role(&self, role: &str) -> bool {
        self.token_parsed()
            .is_some_and(|claims| claims.has_realm_role(role))
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    match token.get(..12) {
        Some(prefix) if token.len() > 16 => format!("{prefix}..."),
        _ => "***".to_string(),
    }
}
