//! Session cache.
//!
//! Stores provider sessions in `<home>/session.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::token::now_secs;

/// Tokens of one provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// The access token (short-lived JWT)
    pub access: String,
    /// The refresh token (long-lived)
    pub refresh: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Access token expiry, seconds since epoch
    pub expires: u64,
}

impl StoredSession {
    /// Same rule as [`TokenClaims::expires_within`](super::TokenClaims::expires_within),
    /// against the expiry recorded when the tokens were issued.
    pub fn expires_within(&self, min_validity_secs: u64) -> bool {
        now_secs().saturating_add(min_validity_secs) > self.expires
    }
}

/// On-disk cache: session key -> session.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SessionCache {
    #[serde(flatten)]
    pub sessions: HashMap<String, StoredSession>,
}

/// File-backed store for a single session key.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    key: String,
}

impl SessionStore {
    /// Creates a store for `key` backed by the cache file at `path`.
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    /// Builds the cache key for a provider/realm/client triple.
    pub fn key_for(url: &str, realm: &str, client_id: &str) -> String {
        format!("{url}|{realm}|{client_id}")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the session for this key, if any.
    ///
    /// # Errors
    /// Returns an error if the cache exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<StoredSession>> {
        let cache = self.load_cache()?;
        Ok(cache.sessions.get(&self.key).cloned())
    }

    /// Saves the session for this key, keeping other entries.
    ///
    /// # Errors
    /// Returns an error if the cache cannot be read or written.
    pub fn save(&self, session: &StoredSession) -> Result<()> {
        let mut cache = self.load_cache()?;
        cache.sessions.insert(self.key.clone(), session.clone());
        self.save_cache(&cache)
    }

    /// Removes the session for this key. Returns whether one existed.
    ///
    /// # Errors
    /// Returns an error if the cache cannot be read or written.
    pub fn clear(&self) -> Result<bool> {
        let mut cache = self.load_cache()?;
        let had_session = cache.sessions.remove(&self.key).is_some();
        if had_session {
            self.save_cache(&cache)?;
        }
        Ok(had_session)
    }

    fn load_cache(&self) -> Result<SessionCache> {
        if !self.path.exists() {
            return Ok(SessionCache::default());
        }

        let contents = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read session cache from {}", self.path.display())
        })?;

        serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse session cache from {}", self.path.display())
        })
    }

    fn save_cache(&self, cache: &SessionCache) -> Result<()> {
        let path = &self.path;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(cache).context("Failed to serialize session cache")?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;

        Ok(())
    }
}
