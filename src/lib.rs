//! `embedres` - Video embed resolver
//!
//! # Features
//!
//! - **Direct APIs**: provider direct-link endpoints, bilingual JSON
//!   payloads, quality-tier selection
//! - **Interception**: headless Chromium renders embed pages and the first
//!   HLS manifest request is captured with its `Referer`/`User-Agent`
//! - **Graceful degradation**: every path ends in a playable URL, falling
//!   back to the provider's embed page
//! - **Caching**: TTL-bounded, in-memory, with in-flight deduplication
//!
//! # Example
//!
//! ```rust,no_run
//! use embedres::{Config, ResolutionReference, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::from_config(&Config::load(None)?)?;
//!     let result = resolver
//!         .resolve(&ResolutionReference::new("wish", "abc123"))
//!         .await?;
//!     println!("{} ({})", result.url, result.strategy);
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod http_client;
pub mod resolve;

pub use browser::{BrowserLauncher, BrowserSession, ChromiumLauncher, PageEvent, PausedRequest};
pub use config::Config;
pub use error::ResolveError;
pub use fingerprint::{chrome_profile, BrowserProfile, DEFAULT_USER_AGENT};
pub use http_client::AcceleratedClient;
pub use resolve::{
    ProviderConfig, ProviderKind, QualityVariant, ResolutionReference, ResolutionResult,
    Resolver, Strategy,
};

/// Version of embedres
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
