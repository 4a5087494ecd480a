//! Configuration management for iamgate.
//!
//! Loads configuration from ${IAMGATE_HOME}/config.toml. The `[provider]`
//! section has no defaults: a missing file or key is an error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::identity::{InitOptions, OnLoad, PkceMethod};

/// Default config template with comments, embedded at compile time.
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("default_config.toml");

/// Environment variable overriding `provider.url`.
pub const PROVIDER_URL_ENV: &str = "IAMGATE_PROVIDER_URL";

pub mod paths {
    //! Path resolution for iamgate configuration and data files.
    //!
    //! IAMGATE_HOME resolution order:
    //! 1. IAMGATE_HOME environment variable (if set)
    //! 2. ~/.config/iamgate (default)

    use std::path::PathBuf;

    /// Returns the iamgate home directory.
    ///
    /// Checks IAMGATE_HOME env var first, falls back to ~/.config/iamgate,
    /// and to a relative `.iamgate` directory when no home directory exists.
    pub fn iamgate_home() -> PathBuf {
        if let Ok(home) = std::env::var("IAMGATE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".iamgate"),
            |h| h.join(".config").join("iamgate"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        iamgate_home().join("config.toml")
    }

    /// Returns the path to the session cache.
    pub fn session_path() -> PathBuf {
        iamgate_home().join("session.json")
    }
}

/// Identity provider coordinates. All three are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider, e.g. `http://localhost:8080`
    pub url: String,
    /// Realm identifier
    pub realm: String,
    /// Client identifier registered with the provider
    pub client_id: String,
}

/// Handshake settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    pub on_load: OnLoad,
    pub pkce_method: PkceMethod,
    /// Path appended to the callback origin for silent SSO checks
    pub silent_check_sso_path: String,
    /// Run a browser round trip with `prompt=none` when no session is cached
    pub silent_check_sso_browser: bool,
    /// Loopback port for login callbacks
    pub callback_port: u16,
}

impl InitConfig {
    const DEFAULT_SILENT_CHECK_SSO_PATH: &str = "/silent-check-sso.html";
    const DEFAULT_CALLBACK_PORT: u16 = 8976;
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            on_load: OnLoad::CheckSso,
            pkce_method: PkceMethod::S256,
            silent_check_sso_path: Self::DEFAULT_SILENT_CHECK_SSO_PATH.to_string(),
            silent_check_sso_browser: false,
            callback_port: Self::DEFAULT_CALLBACK_PORT,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Optional log file; logs go to stderr when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    pub provider: ProviderConfig,

    #[serde(default)]
    pub init: InitConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file is missing, unreadable or invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path and applies env overrides.
    ///
    /// # Errors
    /// Returns an error if the file is missing, unreadable or invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "No configuration found at {}. Run `iamgate config init` and set the [provider] section.",
                path.display()
            );
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        config.provider.url = resolve_provider_url(
            &config.provider.url,
            std::env::var(PROVIDER_URL_ENV).ok().as_deref(),
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Creates the commented default config file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, DEFAULT_CONFIG_TEMPLATE)
    }

    /// Origin of the local callback listener.
    pub fn app_origin(&self) -> String {
        format!("http://127.0.0.1:{}", self.init.callback_port)
    }

    /// Builds the handshake options handed to the identity client.
    ///
    /// # Errors
    /// Returns an error if the silent-check-sso target is not a valid URL.
    pub fn init_options(&self) -> Result<InitOptions> {
        let target = format!("{}{}", self.app_origin(), self.init.silent_check_sso_path);
        let silent_check_sso_redirect_uri = Url::parse(&target)
            .with_context(|| format!("Invalid silent check-sso redirect target: {target}"))?;

        Ok(InitOptions {
            on_load: self.init.on_load,
            silent_check_sso_redirect_uri,
            pkce_method: self.init.pkce_method,
            silent_check_sso_browser: self.init.silent_check_sso_browser,
        })
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.provider.url)
            .with_context(|| format!("Invalid provider URL: {}", self.provider.url))?;
        if self.provider.realm.trim().is_empty() {
            anyhow::bail!("provider.realm must not be empty");
        }
        if self.provider.client_id.trim().is_empty() {
            anyhow::bail!("provider.client_id must not be empty");
        }
        if !self.init.silent_check_sso_path.starts_with('/') {
            anyhow::bail!(
                "init.silent_check_sso_path must start with '/': {}",
                self.init.silent_check_sso_path
            );
        }
        Ok(())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Resolves the provider URL with precedence: env > config.
fn resolve_provider_url(config_url: &str, env_url: Option<&str>) -> Result<String> {
    if let Some(env_url) = env_url {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            Url::parse(trimmed).with_context(|| format!("Invalid {PROVIDER_URL_ENV}: {trimmed}"))?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(config_url.trim().trim_end_matches('/').to_string())
}
