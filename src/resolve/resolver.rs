//! Public entry point: cache, strategy dispatch and last-resort fallback.
//!
//! ```text
//! reference ─► cache ─hit─► result
//!                │miss
//!                ▼
//!        in-flight map ─joined─► shared outcome
//!                │first caller
//!                ▼
//!   direct provider ─► DirectApiStrategy  (always a result)
//!   intercept/URL   ─► InterceptionStrategy ─None─► embed URL
//!                │
//!                ▼
//!   cache (non-degraded only) ─► result
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};

use super::cache::ResultCache;
use super::direct::DirectApiStrategy;
use super::intercept::{InterceptSettings, InterceptionStrategy};
use super::provider::{extract_file_code, is_http_url, ProviderKind, ProviderRegistry};
use super::types::{ResolutionReference, ResolutionResult};
use crate::browser::{BrowserLauncher, ChromiumLauncher};
use crate::config::Config;
use crate::error::{ResolveError, Result};
use crate::fingerprint::chrome_profile;
use crate::http_client::AcceleratedClient;

type SharedResolution = Shared<BoxFuture<'static, Result<ResolutionResult>>>;

/// Resolves references into playable URLs. Cheap to clone; clones share
/// the cache, the browser session limit and in-flight resolutions.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    providers: ProviderRegistry,
    direct: DirectApiStrategy,
    intercept: InterceptionStrategy,
    cache: ResultCache,
    inflight: Mutex<HashMap<String, SharedResolution>>,
}

impl Resolver {
    /// Assemble a resolver from its parts.
    pub fn new(
        providers: ProviderRegistry,
        direct: DirectApiStrategy,
        intercept: InterceptionStrategy,
        cache: ResultCache,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                providers,
                direct,
                intercept,
                cache,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Build a resolver from configuration with the Chromium launcher.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let launcher = ChromiumLauncher::new(config.browser.executable.clone())
            .with_extra_args(config.browser.extra_args.clone());
        Self::from_config_with_launcher(config, Arc::new(launcher))
    }

    /// Build a resolver from configuration with a custom browser launcher.
    pub fn from_config_with_launcher(
        config: &Config,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> anyhow::Result<Self> {
        let client = AcceleratedClient::with_profile(
            chrome_profile(),
            Duration::from_secs(config.http.timeout_secs),
        )?;
        let settings = InterceptSettings {
            navigation_timeout: Duration::from_secs(config.browser.navigation_timeout_secs),
            settle_delay: Duration::from_secs(config.browser.settle_delay_secs),
            max_sessions: config.browser.max_sessions,
            user_agent: config.browser.user_agent.clone(),
        };

        Ok(Self::new(
            ProviderRegistry::new(config.providers.clone()),
            DirectApiStrategy::new(client),
            InterceptionStrategy::new(launcher, settings),
            ResultCache::new(Duration::from_secs(config.cache.ttl_secs)),
        ))
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    /// Resolve a reference to a playable URL and its request headers.
    ///
    /// Provider failures degrade to the provider's embed page instead of
    /// erroring; the returned URL is never empty. Errors are limited to
    /// references that cannot be mapped to any URL and to environments
    /// where no browser can be started.
    #[instrument(skip(self), fields(provider = %reference.provider, target = %reference.target))]
    pub async fn resolve(&self, reference: &ResolutionReference) -> Result<ResolutionResult> {
        if reference.target.trim().is_empty() {
            return Err(ResolveError::InvalidReference("empty target".to_string()));
        }

        let key = reference.cache_key();
        if let Some(hit) = self.inner.cache.get(&key).await {
            debug!(strategy = %hit.strategy, "Cache hit");
            return Ok(hit);
        }

        let pending = {
            let mut inflight = self.inner.inflight.lock().await;
            // The owner of a finished resolution fills the cache before it
            // leaves the in-flight map, so this check cannot miss both.
            if let Some(hit) = self.inner.cache.get(&key).await {
                return Ok(hit);
            }
            if let Some(existing) = inflight.get(&key) {
                debug!("Joining in-flight resolution");
                existing.clone()
            } else {
                let pending = self.spawn_resolution(key.clone(), reference.clone());
                inflight.insert(key, pending.clone());
                pending
            }
        };

        pending.await
    }

    /// Run only the interception strategy against an embed URL.
    pub async fn intercept_only(&self, embed_url: &str) -> Result<Option<ResolutionResult>> {
        self.inner.intercept.resolve(embed_url).await
    }

    /// Start resolving `key` on its own task.
    ///
    /// The task owns the browser session, the session permit and the
    /// in-flight entry, so it runs to completion and releases them even
    /// when every waiter has gone away.
    fn spawn_resolution(&self, key: String, reference: ResolutionReference) -> SharedResolution {
        let this = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(
            async move {
                let outcome = this.resolve_uncached(&reference).await;
                if let Ok(result) = &outcome {
                    if result.is_degraded() {
                        debug!("Degraded result, not caching");
                    } else {
                        this.inner.cache.insert(&task_key, result.clone()).await;
                    }
                }
                this.inner.inflight.lock().await.remove(&task_key);
                outcome
            }
            .in_current_span(),
        );

        let inner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Resolution task failed");
                    inner.inflight.lock().await.remove(&key);
                    Err(ResolveError::TaskFailed(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn resolve_uncached(&self, reference: &ResolutionReference) -> Result<ResolutionResult> {
        let target = reference.target.trim();
        let provider = self.inner.providers.find(&reference.provider, target);

        let result = match provider {
            Some(provider) if provider.kind == ProviderKind::Direct => {
                let file_code = extract_file_code(target);
                self.inner
                    .direct
                    .resolve(provider, &file_code, reference.api_key.as_deref())
                    .await
            }
            Some(provider) => self.intercept_or_embed(&provider.embed_url(target)).await?,
            None if is_http_url(target) => {
                debug!("No configured provider, treating target as a generic embed page");
                self.intercept_or_embed(target).await?
            }
            None => return Err(ResolveError::UnknownProvider(reference.provider.clone())),
        };

        info!(strategy = %result.strategy, "Resolved");
        Ok(result)
    }

    async fn intercept_or_embed(&self, embed_url: &str) -> Result<ResolutionResult> {
        match self.inner.intercept.resolve(embed_url).await? {
            Some(result) => Ok(result),
            None => {
                warn!(url = %embed_url, "Falling back to embed page");
                Ok(ResolutionResult::fallback_embed(embed_url))
            }
        }
    }
}
