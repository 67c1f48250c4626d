//! Provider registry.
//!
//! A provider is either backed by a direct-link API (`kind = "direct"`) or
//! only reachable by rendering its embed page (`kind = "intercept"`).

use serde::{Deserialize, Serialize};
use url::Url;

/// Which strategy family a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Direct,
    Intercept,
}

/// One configured provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    /// Scheme and host, e.g. `https://streamwish.com`.
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `<base>/api/file/direct_link`
    pub fn direct_link_endpoint(&self) -> String {
        format!("{}/api/file/direct_link", self.base())
    }

    /// `<base>/embed-<code>.html`
    pub fn fallback_embed_url(&self, file_code: &str) -> String {
        format!("{}/embed-{file_code}.html", self.base())
    }

    /// Embed page for a target: URLs pass through, codes are templated.
    pub fn embed_url(&self, target: &str) -> String {
        if is_http_url(target) {
            target.to_string()
        } else {
            self.fallback_embed_url(&extract_file_code(target))
        }
    }

    /// API key, preferring a non-blank per-reference override.
    pub fn api_key<'a>(&'a self, reference_key: Option<&'a str>) -> Option<&'a str> {
        let non_blank = |k: &'a str| Some(k.trim()).filter(|k| !k.is_empty());
        reference_key
            .and_then(non_blank)
            .or_else(|| self.api_key.as_deref().and_then(non_blank))
    }

    fn host(&self) -> Option<String> {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
    }
}

/// Lookup table over configured providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    /// Find the provider for a reference: by id first, then by the host of
    /// a URL target.
    pub fn find(&self, provider_id: &str, target: &str) -> Option<&ProviderConfig> {
        let id = provider_id.trim();
        self.providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .or_else(|| self.find_by_url(target))
    }

    fn find_by_url(&self, target: &str) -> Option<&ProviderConfig> {
        let host = Url::parse(target)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))?
            .host_str()
            .map(normalize_host)?;
        self.providers
            .iter()
            .find(|p| p.host().as_deref() == Some(host.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Returns `true` for absolute http(s) URLs.
pub fn is_http_url(target: &str) -> bool {
    Url::parse(target.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Extract a provider file code from a bare code or an embed URL.
///
/// Handles `.../embed-<code>.html`, `.../e/<code>`, `.../<code>.html` and
/// plain `.../<code>`; query strings and fragments are ignored.
pub fn extract_file_code(target: &str) -> String {
    let target = target.trim();
    if !is_http_url(target) {
        return target.to_string();
    }

    let last = Url::parse(target)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_default();

    let code = last.strip_prefix("embed-").unwrap_or(&last);
    let code = code.strip_suffix(".html").unwrap_or(code);
    code.to_string()
}

fn normalize_host(host: &str) -> String {
    host.trim_start_matches("www.").to_ascii_lowercase()
}
