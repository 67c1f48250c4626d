//! HTTP client for provider APIs
//!
//! Features:
//! - HTTP/2 where the server negotiates it, HTTP/1.1 otherwise
//! - TLS 1.3 via rustls
//! - Brotli, Zstd, Gzip compression (auto-negotiated)
//! - Connection pooling with keep-alive
//! - Browser-like default headers

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::fingerprint::{chrome_profile, BrowserProfile};

/// Default whole-request timeout for provider API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared HTTP client used for provider API calls.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Clone)]
pub struct AcceleratedClient {
    client: Client,
    profile: BrowserProfile,
}

impl AcceleratedClient {
    /// Create a client with a Chrome profile and the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_profile(chrome_profile(), DEFAULT_TIMEOUT)
    }

    /// Create client with specific browser profile and request timeout.
    pub fn with_profile(profile: BrowserProfile, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            // HTTP/2 flow-control window follows measured bandwidth
            .http2_adaptive_window(true)
            .hickory_dns(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            .default_headers(profile.to_headers())
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self { client, profile })
    }

    /// GET `url` with query parameters and decode the body as JSON.
    ///
    /// Non-2xx statuses are errors; so is a body that is not JSON.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        debug!(
            status = %response.status(),
            version = ?response.version(),
            "Response received"
        );

        Ok(response.json::<Value>().await?)
    }

    /// Get the browser profile this client presents
    #[must_use]
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    /// Get the underlying reqwest client
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
