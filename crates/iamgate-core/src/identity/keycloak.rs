//! Keycloak-style OpenID-Connect client.
//!
//! Endpoints are derived from the provider URL and realm:
//! `<url>/realms/<realm>/protocol/openid-connect/{auth,token,logout}`.
//! Login uses the authorization-code flow with PKCE and a loopback redirect.
//! The current session is held in memory and mirrored to the session cache.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use super::callback::{self, CallbackListener, CallbackOutcome, LOGIN_CALLBACK_PATH};
use super::pkce::{Pkce, generate_pkce};
use super::store::{SessionStore, StoredSession};
use super::token::{TokenClaims, now_secs};
use super::{IdentityClient, InitOptions, OnLoad, PkceMethod, mask_token};
use crate::config::{Config, paths};
use crate::interrupt;

/// Set to skip opening a browser during login (the URL is still printed).
pub const NO_BROWSER_ENV: &str = "IAMGATE_NO_BROWSER";

/// Minimum remaining validity for a restored access token.
const RESTORE_MIN_VALIDITY_SECS: u64 = 5;
/// How long the interactive login waits for the browser redirect.
const LOGIN_CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);
/// How long a silent check waits for the `prompt=none` redirect.
const SILENT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCOPES: &str = "openid";

/// Provider endpoints for one realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorization: String,
    pub token: String,
    pub logout: String,
}

impl Endpoints {
    pub fn for_realm(url: &str, realm: &str) -> Self {
        let base = format!(
            "{}/realms/{}/protocol/openid-connect",
            url.trim_end_matches('/'),
            url::form_urlencoded::byte_serialize(realm.as_bytes()).collect::<String>()
        );
        Self {
            authorization: format!("{base}/auth"),
            token: format!("{base}/token"),
            logout: format!("{base}/logout"),
        }
    }
}

/// The token endpoint rejected a grant (as opposed to a transport failure).
#[derive(Debug)]
pub struct TokenRejected {
    pub status: reqwest::StatusCode,
    pub body: String,
}

impl std::fmt::Display for TokenRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token request rejected (HTTP {}): {}", self.status, self.body)
    }
}

impl std::error::Error for TokenRejected {}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct Session {
    tokens: StoredSession,
    claims: TokenClaims,
}

impl Session {
    /// Prefers the token's own `exp`; opaque expiry falls back to the
    /// `expires_in` recorded at issue.
    fn expires_within(&self, min_validity_secs: u64) -> bool {
        if self.claims.exp.is_some() {
            self.claims.expires_within(min_validity_secs)
        } else {
            self.tokens.expires_within(min_validity_secs)
        }
    }
}

/// Opens an authorization URL for the user.
pub type BrowserOpener = Arc<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

fn system_browser() -> BrowserOpener {
    Arc::new(|url: &str| open::that(url))
}

/// OpenID-Connect client for a Keycloak realm.
pub struct KeycloakClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    client_id: String,
    callback_port: u16,
    pkce_method: PkceMethod,
    browser: Option<BrowserOpener>,
    /// Wait for the loopback redirect before asking for a pasted code
    listen_for_redirect: bool,
    store: SessionStore,
    session: Option<Session>,
}

impl KeycloakClient {
    /// Creates a client for the configured provider backed by the default
    /// session cache.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = SessionStore::key_for(
            &config.provider.url,
            &config.provider.realm,
            &config.provider.client_id,
        );
        Self::new(config, SessionStore::new(paths::session_path(), key))
    }

    /// Creates a client for the configured provider with an explicit store.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, store: SessionStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoints: Endpoints::for_realm(&config.provider.url, &config.provider.realm),
            client_id: config.provider.client_id.clone(),
            callback_port: config.init.callback_port,
            pkce_method: config.init.pkce_method,
            browser: std::env::var(NO_BROWSER_ENV).is_err().then(system_browser),
            listen_for_redirect: io::stdin().is_terminal(),
            store,
            session: None,
        })
    }

    /// Overrides whether login opens a browser.
    #[must_use]
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.browser = open_browser.then(system_browser);
        self
    }

    /// Replaces the system browser.
    #[must_use]
    pub fn with_browser_opener(mut self, opener: BrowserOpener) -> Self {
        self.browser = Some(opener);
        self
    }

    /// Overrides whether login waits for the loopback redirect. Defaults to
    /// whether stdin is a terminal.
    #[must_use]
    pub fn with_redirect_listener(mut self, listen: bool) -> Self {
        self.listen_for_redirect = listen;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The cache backing this client's session.
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    fn login_redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{LOGIN_CALLBACK_PATH}", self.callback_port)
    }

    /// Builds the authorization URL for the code flow.
    pub fn build_auth_url(
        &self,
        pkce: &Pkce,
        state: &str,
        redirect_uri: &str,
        prompt: Option<&str>,
    ) -> String {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("response_mode", "query"),
            ("redirect_uri", redirect_uri),
            ("scope", SCOPES),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", pkce.method.as_str()),
        ];
        if let Some(prompt) = prompt {
            params.push(("prompt", prompt));
        }

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        format!("{}?{query}", self.endpoints.authorization)
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    /// Returns an error if the request fails or the provider rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce: &Pkce,
        redirect_uri: &str,
    ) -> Result<StoredSession> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", pkce.verifier.as_str()),
        ];
        self.token_request(&form, None)
            .await
            .context("Token exchange failed")
    }

    /// Uses a refresh token to obtain a new access token.
    ///
    /// # Errors
    /// Returns an error if the request fails or the provider rejects the grant.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<StoredSession> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form, Some(refresh_token))
            .await
            .context("Token refresh failed")
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        previous_refresh: Option<&str>,
    ) -> Result<StoredSession> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .form(form)
            .send()
            .await
            .context("Failed to send token request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenRejected { status, body }.into());
        }

        let token_data: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        let refresh = token_data
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();

        Ok(StoredSession {
            access: token_data.access_token,
            refresh,
            id_token: token_data.id_token,
            expires: now_secs().saturating_add(token_data.expires_in),
        })
    }

    /// Parses, persists and installs a fresh token set.
    fn install(&mut self, mut tokens: StoredSession) -> Result<()> {
        let claims = TokenClaims::from_jwt(&tokens.access)?;
        if let Some(exp) = claims.exp {
            tokens.expires = exp;
        }
        self.store.save(&tokens)?;
        tracing::debug!(token = %mask_token(&tokens.access), "installed access token");
        self.session = Some(Session { tokens, claims });
        Ok(())
    }

    /// Drops the in-memory session and its cache entry.
    fn clear_session(&mut self) -> Result<()> {
        self.session = None;
        self.store.clear()?;
        Ok(())
    }

    /// Restores the cached session, refreshing it when it is about to expire.
    async fn restore(&mut self, stored: StoredSession) -> Result<bool> {
        let claims = match TokenClaims::from_jwt(&stored.access) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable cached session");
                self.clear_session()?;
                return Ok(false);
            }
        };

        let cached = Session {
            tokens: stored,
            claims,
        };
        if !cached.expires_within(RESTORE_MIN_VALIDITY_SECS) {
            self.session = Some(cached);
            return Ok(true);
        }

        tracing::debug!("cached access token expired, refreshing");
        match self.refresh_grant(&cached.tokens.refresh).await {
            Ok(tokens) => {
                self.install(tokens)?;
                Ok(true)
            }
            Err(e) => {
                if e.downcast_ref::<TokenRejected>().is_some() {
                    self.clear_session()?;
                }
                Err(e.context("Cached session could not be restored"))
            }
        }
    }

    /// `prompt=none` round trip: succeeds only if the provider still has a
    /// browser session for the user.
    async fn silent_check_sso(&mut self, redirect_uri: &Url) -> Result<bool> {
        if self.browser.is_none() {
            return Ok(false);
        }

        let listener =
            match CallbackListener::bind(redirect_uri.port().unwrap_or(80), redirect_uri.path())
                .await
            {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "silent check-sso unavailable");
                    return Ok(false);
                }
            };

        let pkce = generate_pkce(self.pkce_method);
        let state = uuid::Uuid::new_v4().to_string();
        let auth_url = self.build_auth_url(&pkce, &state, redirect_uri.as_str(), Some("none"));
        if !self.launch_browser(&auth_url) {
            return Ok(false);
        }

        match interrupt::until_interrupted(listener.wait(&state, SILENT_CHECK_TIMEOUT)).await? {
            Some(CallbackOutcome::Code(code)) => {
                let tokens = self
                    .exchange_code(&code, &pkce, redirect_uri.as_str())
                    .await?;
                self.install(tokens)?;
                Ok(true)
            }
            Some(CallbackOutcome::Error { error, .. }) => {
                tracing::debug!(%error, "silent check-sso found no provider session");
                Ok(false)
            }
            None => {
                tracing::info!("silent check-sso timed out");
                Ok(false)
            }
        }
    }

    /// Opens `url` in the browser. Failures are logged only.
    fn launch_browser(&self, url: &str) -> bool {
        let Some(opener) = &self.browser else {
            return false;
        };
        match opener(url) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open browser");
                false
            }
        }
    }

    /// Binds the login callback listener, if redirects are awaited at all.
    async fn bind_login_listener(&self) -> Option<CallbackListener> {
        if !self.listen_for_redirect {
            return None;
        }
        match CallbackListener::bind(self.callback_port, LOGIN_CALLBACK_PATH).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "falling back to pasted code");
                None
            }
        }
    }

    /// Waits for the browser redirect. Returns `None` on timeout.
    async fn wait_for_login_code(
        listener: CallbackListener,
        state: &str,
    ) -> Result<Option<String>> {
        match interrupt::until_interrupted(listener.wait(state, LOGIN_CALLBACK_TIMEOUT)).await? {
            Some(CallbackOutcome::Code(code)) => Ok(Some(code)),
            Some(CallbackOutcome::Error { error, description }) => {
                let detail = description.map(|d| format!(": {d}")).unwrap_or_default();
                anyhow::bail!("Login failed ({error}){detail}")
            }
            None => Ok(None),
        }
    }

    fn read_pasted_code(state: &str) -> Result<String> {
        eprint!("Paste authorization code (or full redirect URL): ");
        io::stderr().flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        let (code, provided_state) = callback::parse_authorization_input(&input);
        if let Some(provided) = provided_state
            && provided != state
        {
            anyhow::bail!("State mismatch");
        }
        code.ok_or_else(|| anyhow::anyhow!("Authorization code cannot be empty"))
    }
}

impl IdentityClient for KeycloakClient {
    async fn init(&mut self, options: &InitOptions) -> Result<bool> {
        self.pkce_method = options.pkce_method;
        self.session = None;

        let mut authenticated = match self.store.load()? {
            Some(stored) => self.restore(stored).await?,
            None => false,
        };

        if !authenticated && options.silent_check_sso_browser {
            authenticated = self
                .silent_check_sso(&options.silent_check_sso_redirect_uri)
                .await?;
        }

        if !authenticated && options.on_load == OnLoad::LoginRequired {
            self.login().await?;
            authenticated = self.session.is_some();
        }

        tracing::debug!(on_load = options.on_load.as_str(), authenticated, "handshake settled");
        Ok(authenticated)
    }

    async fn login(&mut self) -> Result<()> {
        let pkce = generate_pkce(self.pkce_method);
        let state = uuid::Uuid::new_v4().to_string();
        let redirect_uri = self.login_redirect_uri();
        let auth_url = self.build_auth_url(&pkce, &state, &redirect_uri, None);

        eprintln!("To log in:");
        eprintln!();
        eprintln!("  1. A browser window will open (or visit the URL below)");
        eprintln!("  2. Sign in with the identity provider");
        eprintln!("  3. If redirected to {redirect_uri}, return here to continue");
        eprintln!("  4. Otherwise, paste the authorization code or URL");
        eprintln!();
        eprintln!("Authorization URL:");
        eprintln!("  {auth_url}");
        eprintln!();

        let listener = self.bind_login_listener().await;
        self.launch_browser(&auth_url);

        let redirected = match listener {
            Some(listener) => Self::wait_for_login_code(listener, &state).await?,
            None => None,
        };
        let code = match redirected {
            Some(code) => code,
            None => Self::read_pasted_code(&state)?,
        };

        let tokens = self.exchange_code(&code, &pkce, &redirect_uri).await?;
        self.install(tokens)?;
        tracing::info!("login completed");
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            self.store.clear()?;
            return Ok(());
        };

        let form = [
            ("client_id", self.client_id.as_str()),
            ("refresh_token", session.tokens.refresh.as_str()),
        ];
        match self.http.post(&self.endpoints.logout).form(&form).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("provider session ended");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "provider rejected logout");
            }
            Err(e) => {
                tracing::warn!(error = %e, "logout request failed");
            }
        }

        self.store.clear()?;
        tracing::info!("logged out");
        Ok(())
    }

    async fn update_token(&mut self, min_validity: Duration) -> Result<bool> {
        let Some(session) = &self.session else {
            anyhow::bail!("No session to refresh");
        };
        if !session.expires_within(min_validity.as_secs()) {
            return Ok(false);
        }

        let refresh = session.tokens.refresh.clone();
        match self.refresh_grant(&refresh).await {
            Ok(tokens) => {
                self.install(tokens)?;
                Ok(true)
            }
            Err(e) => {
                if e.downcast_ref::<TokenRejected>().is_some() {
                    self.clear_session()?;
                }
                Err(e)
            }
        }
    }

    fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.tokens.access.as_str())
    }

    fn token_parsed(&self) -> Option<&TokenClaims> {
        self.session.as_ref().map(|s| &s.claims)
    }
}
