//! Persisted session cookie and the stores that hold it.
//!
//! Web front ends keep the token in a host-scoped cookie. Here the same
//! record is kept by a `CookieJar`: in memory, in a JSON file under the
//! cache directory, or in the OS keychain.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

/// Name of the cookie that carries the session token
pub const SESSION_COOKIE: &str = "sidita";

/// Session cookies live for a year
const COOKIE_LIFETIME_DAYS: i64 = 365;

/// Cookie file name in cache directory
const COOKIE_FILE: &str = "cookies.json";

/// Keychain service name
const SERVICE_NAME: &str = "sidita";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: String,
    pub expires: DateTime<Utc>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl PersistedCookie {
    /// The session token cookie: path `/`, one-year expiry, secure, strict
    pub fn session_token(token: &str, domain: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: SESSION_COOKIE.to_string(),
            value: token.to_string(),
            path: "/".to_string(),
            domain: domain.to_string(),
            expires: now + Duration::days(COOKIE_LIFETIME_DAYS),
            secure: true,
            same_site: SameSite::Strict,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires
    }

    /// Render as a `Set-Cookie` header value
    pub fn to_set_cookie(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Domain={}; Expires={}",
            self.name,
            self.value,
            self.path,
            self.domain,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header.push_str("; SameSite=");
        header.push_str(self.same_site.as_str());
        header
    }
}

/// Storage for persisted cookies. Expired cookies are never returned.
pub trait CookieJar: Send + Sync {
    fn set(&self, cookie: PersistedCookie) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<PersistedCookie>>;
    fn remove(&self, name: &str) -> Result<()>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, PersistedCookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CookieJar for MemoryCookieJar {
    fn set(&self, cookie: PersistedCookie) -> Result<()> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cookie.name.clone(), cookie);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<PersistedCookie>> {
        Ok(self
            .cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .filter(|c| !c.is_expired())
            .cloned())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

// ============================================================================
// JSON file
// ============================================================================

pub struct FileCookieJar {
    cache_dir: PathBuf,
}

impl FileCookieJar {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn cookie_path(&self) -> PathBuf {
        self.cache_dir.join(COOKIE_FILE)
    }

    fn load(&self) -> Result<HashMap<String, PersistedCookie>> {
        let path = self.cookie_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read cookie file")?;
        serde_json::from_str(&contents).context("Failed to parse cookie file")
    }

    fn save(&self, cookies: &HashMap<String, PersistedCookie>) -> Result<()> {
        let path = self.cookie_path();
        if cookies.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove cookie file")?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&path, contents).context("Failed to write cookie file")?;
        Ok(())
    }
}

impl CookieJar for FileCookieJar {
    fn set(&self, cookie: PersistedCookie) -> Result<()> {
        let mut cookies = self.load()?;
        cookies.insert(cookie.name.clone(), cookie);
        self.save(&cookies)
    }

    fn get(&self, name: &str) -> Result<Option<PersistedCookie>> {
        Ok(self.load()?.remove(name).filter(|c| !c.is_expired()))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut cookies = self.load()?;
        if cookies.remove(name).is_some() {
            self.save(&cookies)?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Keeps each cookie, attributes included, as one keychain secret
pub struct KeyringCookieJar;

impl KeyringCookieJar {
    fn entry(name: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, name).context("Failed to create keyring entry")
    }
}

impl CookieJar for KeyringCookieJar {
    fn set(&self, cookie: PersistedCookie) -> Result<()> {
        let secret = serde_json::to_string(&cookie)?;
        Self::entry(&cookie.name)?
            .set_password(&secret)
            .context("Failed to store cookie in keychain")
    }

    fn get(&self, name: &str) -> Result<Option<PersistedCookie>> {
        match Self::entry(name)?.get_password() {
            Ok(secret) => {
                let cookie: PersistedCookie = serde_json::from_str(&secret)
                    .context("Failed to parse cookie from keychain")?;
                Ok(Some(cookie).filter(|c| !c.is_expired()))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve cookie from keychain"),
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        match Self::entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete cookie from keychain"),
        }
    }
}
