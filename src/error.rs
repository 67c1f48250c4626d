//! Hard errors surfaced by the resolver.
//!
//! Provider misbehaviour (HTTP failures, odd JSON, pages that never request
//! a manifest) is not represented here: it degrades to a fallback result.
//! These variants cover the cases where no meaningful fallback exists.

use thiserror::Error;

/// Resolution errors that reach the caller.
///
/// `Clone` so a single in-flight resolution can hand the same outcome to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Unknown provider '{0}' and target is not an embed URL")]
    UnknownProvider(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The background resolution task panicked or was cancelled by the runtime.
    #[error("Resolution task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
