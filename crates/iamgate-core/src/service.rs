//! Authentication facade.
//!
//! `IamService` is the only thing the view layer talks to. It owns the
//! identity client and delegates every query to it; authentication state is
//! never tracked independently of the client's token.

use std::time::Duration;

use anyhow::Result;

use crate::identity::{IdentityClient, InitOptions, mask_token};

/// Minimum remaining validity requested from `update_token`.
pub const REFRESH_MIN_VALIDITY: Duration = Duration::from_secs(5);

/// How the handshake settled. `initialize` never fails; callers render
/// whatever the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Authenticated,
    Anonymous,
    /// The handshake was rejected; state stays anonymous.
    Failed,
}

/// Result of [`IamService::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    StillValid,
    /// The refresh failed and an interactive login was started instead.
    LoginTriggered,
}

/// Name of the role every user of `realm` is granted by default.
pub fn default_role_name(realm: &str) -> String {
    format!("default-roles-{realm}")
}

/// Session object wrapping an [`IdentityClient`].
pub struct IamService<C> {
    client: C,
    options: InitOptions,
}

impl<C: IdentityClient> IamService<C> {
    pub fn new(client: C, options: InitOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    /// Performs the provider handshake.
    ///
    /// Rejections are logged and reported as [`InitOutcome::Failed`]; the
    /// caller always proceeds to render.
    pub async fn initialize(&mut self) -> InitOutcome {
        match self.client.init(&self.options).await {
            Ok(authenticated) => {
                if !authenticated {
                    tracing::info!("user is not authenticated");
                }
                if let Some(token) = self.client.token() {
                    tracing::debug!(token = %mask_token(token), "access token present");
                }
                if self.is_authenticated() {
                    InitOutcome::Authenticated
                } else {
                    InitOutcome::Anonymous
                }
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "identity provider handshake failed");
                InitOutcome::Failed
            }
        }
    }

    /// Starts an interactive login.
    ///
    /// # Errors
    /// Returns an error if the login flow fails.
    pub async fn login(&mut self) -> Result<()> {
        self.client.login().await
    }

    /// Ends the session.
    ///
    /// # Errors
    /// Returns an error if the session could not be cleared.
    pub async fn logout(&mut self) -> Result<()> {
        self.client.logout().await
    }

    /// True iff the client currently holds a token.
    pub fn is_authenticated(&self) -> bool {
        self.client.token().is_some()
    }

    /// Refreshes the token if it expires within [`REFRESH_MIN_VALIDITY`].
    ///
    /// On success `on_success` receives whether a refresh happened. On
    /// failure no error is surfaced: a fresh interactive login is started.
    pub async fn refresh<F>(&mut self, on_success: F) -> RefreshOutcome
    where
        F: FnOnce(bool),
    {
        match self.client.update_token(REFRESH_MIN_VALIDITY).await {
            Ok(refreshed) => {
                on_success(refreshed);
                if refreshed {
                    RefreshOutcome::Refreshed
                } else {
                    RefreshOutcome::StillValid
                }
            }
            Err(e) => {
                tracing::info!(error = %format!("{e:#}"), "token refresh failed, starting login");
                if let Err(e) = self.login().await {
                    tracing::error!(error = %format!("{e:#}"), "login after failed refresh did not complete");
                }
                RefreshOutcome::LoginTriggered
            }
        }
    }

    /// The `preferred_username` claim, if a token is present.
    pub fn display_name(&self) -> Option<&str> {
        self.client
            .token_parsed()
            .and_then(|claims| claims.preferred_username.as_deref())
    }

    /// Whether the token carries the realm role `role`.
    pub fn has_role(&self, role: &str) -> bool {
        !role.is_empty() && self.client.has_realm_role(role)
    }
}
