//! Direct-link API strategy.
//!
//! Always produces a playable result: every failure path (no API key,
//! transport error, non-2xx, malformed body, no variants) degrades to the
//! provider's templated embed page.

use tracing::{info, instrument, warn};

use super::provider::ProviderConfig;
use super::schema::{normalize, select_variant};
use super::types::ResolutionResult;
use crate::http_client::AcceleratedClient;

pub struct DirectApiStrategy {
    client: AcceleratedClient,
}

impl DirectApiStrategy {
    pub fn new(client: AcceleratedClient) -> Self {
        Self { client }
    }

    /// Resolve `file_code` against `provider`'s direct-link API.
    #[instrument(skip(self, provider, api_key), fields(provider = %provider.id))]
    pub async fn resolve(
        &self,
        provider: &ProviderConfig,
        file_code: &str,
        api_key: Option<&str>,
    ) -> ResolutionResult {
        let fallback = || ResolutionResult::fallback_embed(provider.fallback_embed_url(file_code));

        let Some(api_key) = provider.api_key(api_key) else {
            warn!("No API key configured, using embed page");
            return fallback();
        };

        let endpoint = provider.direct_link_endpoint();
        let payload = match self
            .client
            .get_json(&endpoint, &[("key", api_key), ("file_code", file_code)])
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Direct-link API failed, using embed page");
                return fallback();
            }
        };

        let variants = normalize(&payload);
        match select_variant(&variants) {
            Some(variant) => {
                info!(tier = %variant.name, available = variants.len(), "Resolved direct link");
                ResolutionResult::direct(variant.url.clone())
            }
            None => {
                warn!("Direct-link API returned no variants, using embed page");
                fallback()
            }
        }
    }
}
