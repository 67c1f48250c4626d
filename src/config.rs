//! Configuration loaded from `~/.config/embedres/config.toml`.
//!
//! ```toml
//! [cache]
//! ttl_secs = 3600
//!
//! [browser]
//! max_sessions = 2
//! extra_args = ["--no-sandbox"]
//!
//! [[providers]]
//! id = "wish"
//! kind = "direct"
//! base_url = "https://wish.example"
//! api_key = "..."
//!
//! [[providers]]
//! id = "vh"
//! kind = "intercept"
//! base_url = "https://vh.example"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fingerprint::DEFAULT_USER_AGENT;
use crate::resolve::provider::ProviderConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "EMBEDRES_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a resolution stays cached; 0 disables the cache.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Browser binary; discovered on `PATH` when unset.
    pub executable: Option<PathBuf>,
    pub max_sessions: usize,
    pub navigation_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub user_agent: String,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            max_sessions: 2,
            navigation_timeout_secs: 30,
            settle_delay_secs: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `path`, `$EMBEDRES_CONFIG`, or the default location, in
    /// that order.
    ///
    /// A missing file at the default location yields the defaults; a
    /// missing file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::from_file(Path::new(&path));
        }

        let path = default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.browser.max_sessions = config.browser.max_sessions.max(1);
        Ok(config)
    }
}

/// Return the path to the default config file.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("embedres")
        .join("config.toml")
}
