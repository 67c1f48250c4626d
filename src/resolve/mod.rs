//! Stream resolution
//!
//! Turns a provider reference into a playable URL plus request headers,
//! either through a provider's direct-link API or by intercepting the
//! manifest request an embed page makes in a headless browser.

pub mod cache;
pub mod direct;
pub mod intercept;
pub mod provider;
pub mod resolver;
pub mod schema;
pub mod types;

pub use cache::{CacheEntry, ResultCache};
pub use direct::DirectApiStrategy;
pub use intercept::{InterceptSettings, InterceptionStrategy};
pub use provider::{ProviderConfig, ProviderKind, ProviderRegistry};
pub use resolver::Resolver;
pub use types::{QualityVariant, ResolutionReference, ResolutionResult, Strategy};
