//! Resolution data model.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What to resolve: a provider, a file code or embed URL, and optional
/// credentials for the provider's API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReference {
    /// Provider identifier as configured (e.g. `"streamwish"`).
    pub provider: String,
    /// Provider file code or a full embed page URL.
    pub target: String,
    /// API key; overrides the key configured for the provider.
    pub api_key: Option<String>,
}

impl ResolutionReference {
    pub fn new(provider: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            target: target.into(),
            api_key: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Cache and deduplication key: provider plus target.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}",
            self.provider.trim().to_ascii_lowercase(),
            self.target.trim()
        )
    }
}

/// One encoding of an asset as reported by a direct provider API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVariant {
    /// Provider-specific tier label (`"h"`, `"n"`, ...).
    pub name: String,
    pub url: String,
}

/// How a [`ResolutionResult`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Direct media URL from the provider API.
    Direct,
    /// Manifest URL captured from a rendered embed page.
    Intercepted,
    /// Provider embed page, used when nothing better could be resolved.
    FallbackEmbed,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Direct => "DIRECT",
            Strategy::Intercepted => "INTERCEPTED",
            Strategy::FallbackEmbed => "FALLBACK_EMBED",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable location plus the headers required to fetch it.
///
/// `url` is never empty. `headers` carries at least `Referer` for
/// [`Strategy::Intercepted`] results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub strategy: Strategy,
}

impl ResolutionResult {
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            strategy: Strategy::Direct,
        }
    }

    pub fn intercepted(url: impl Into<String>, referer: String, user_agent: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Referer".to_string(), referer);
        headers.insert("User-Agent".to_string(), user_agent);
        Self {
            url: url.into(),
            headers,
            strategy: Strategy::Intercepted,
        }
    }

    pub fn fallback_embed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            strategy: Strategy::FallbackEmbed,
        }
    }

    /// Fallback results are playable but lower quality, and are not cached.
    pub fn is_degraded(&self) -> bool {
        self.strategy == Strategy::FallbackEmbed
    }
}
