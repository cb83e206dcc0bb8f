//! Application configuration management.
//!
//! Stored at `~/.config/sidita/config.json`. Every field is optional on disk;
//! `SIDITA_API_URL` and `SIDITA_COOKIE_DOMAIN` override the file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{
    CookieJar, FileCookieJar, KeyringCookieJar, MemoryCookieJar, SessionOptions, LOGIN_ROUTE,
};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sidita";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API used when nothing is configured
const DEFAULT_API_URL: &str = "http://localhost:4000/accounts";

const API_URL_ENV: &str = "SIDITA_API_URL";
const COOKIE_DOMAIN_ENV: &str = "SIDITA_COOKIE_DOMAIN";

/// Where the session cookie is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CookieBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub cookie_domain: Option<String>,
    pub login_route: Option<String>,
    #[serde(default)]
    pub cookie_backend: CookieBackend,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Environment wins over the file
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_url = Some(url);
        }
        if let Some(domain) = var(COOKIE_DOMAIN_ENV).filter(|v| !v.is_empty()) {
            self.cookie_domain = Some(domain);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            cookie_domain: self.cookie_domain.clone(),
            login_route: self
                .login_route
                .clone()
                .unwrap_or_else(|| LOGIN_ROUTE.to_string()),
        }
    }

    /// Build the configured cookie store
    pub fn cookie_jar(&self) -> Result<Arc<dyn CookieJar>> {
        Ok(match self.cookie_backend {
            CookieBackend::File => Arc::new(FileCookieJar::new(self.cache_dir()?)),
            CookieBackend::Keyring => Arc::new(KeyringCookieJar),
            CookieBackend::Memory => Arc::new(MemoryCookieJar::new()),
        })
    }
}
