//! In-memory identity client for tests.

use std::time::Duration;

use anyhow::Result;

use crate::identity::{IdentityClient, InitOptions, TokenClaims};
use crate::identity::token::RealmAccess;

/// Canned token the fake installs on a successful login.
#[derive(Debug, Clone)]
pub struct FakeToken {
    pub raw: String,
    pub claims: TokenClaims,
}

impl FakeToken {
    pub fn new(username: &str, roles: &[&str]) -> Self {
        Self {
            raw: format!("fake-access-token-for-{username}"),
            claims: TokenClaims {
                preferred_username: Some(username.to_string()),
                realm_access: Some(RealmAccess {
                    roles: roles.iter().map(|r| (*r).to_string()).collect(),
                }),
                ..TokenClaims::default()
            },
        }
    }
}

/// Scriptable [`IdentityClient`] that records calls.
#[derive(Debug, Default)]
pub struct FakeIdentityClient {
    /// Token installed by `login` (and by `init` when `sso_session` is set)
    pub login_token: Option<FakeToken>,
    /// Whether `init` finds an existing provider session
    pub sso_session: bool,
    pub fail_init: bool,
    pub fail_login: bool,
    pub fail_refresh: bool,
    /// Whether `update_token` reports that a refresh happened
    pub refresh_needed: bool,
    pub current: Option<FakeToken>,
    pub init_calls: usize,
    pub login_calls: usize,
    pub logout_calls: usize,
    pub refresh_calls: usize,
    pub last_min_validity: Option<Duration>,
}

impl FakeIdentityClient {
    /// A client whose login yields `username` with `roles`.
    pub fn with_user(username: &str, roles: &[&str]) -> Self {
        Self {
            login_token: Some(FakeToken::new(username, roles)),
            ..Self::default()
        }
    }

    /// Same as [`with_user`](Self::with_user), already signed in at the provider.
    pub fn signed_in(username: &str, roles: &[&str]) -> Self {
        Self {
            sso_session: true,
            ..Self::with_user(username, roles)
        }
    }
}

impl IdentityClient for FakeIdentityClient {
    async fn init(&mut self, _options: &InitOptions) -> Result<bool> {
        self.init_calls += 1;
        if self.fail_init {
            anyhow::bail!("provider unreachable");
        }
        if self.sso_session {
            self.current.clone_from(&self.login_token);
        }
        Ok(self.current.is_some())
    }

    async fn login(&mut self) -> Result<()> {
        self.login_calls += 1;
        if self.fail_login {
            anyhow::bail!("login cancelled");
        }
        self.current.clone_from(&self.login_token);
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.logout_calls += 1;
        self.current = None;
        self.sso_session = false;
        Ok(())
    }

    async fn update_token(&mut self, min_validity: Duration) -> Result<bool> {
        self.refresh_calls += 1;
        self.last_min_validity = Some(min_validity);
        if self.fail_refresh {
            anyhow::bail!("refresh token expired");
        }
        if self.current.is_none() {
            anyhow::bail!("No session to refresh");
        }
        Ok(self.refresh_needed)
    }

    fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.raw.as_str())
    }

    fn token_parsed(&self) -> Option<&TokenClaims> {
        self.current.as_ref().map(|t| &t.claims)
    }
}
