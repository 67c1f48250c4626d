//! Headless browsing sessions.
//!
//! The interception strategy only needs a small surface from a browser:
//! pause requests matching a URL pattern, navigate, report what happened,
//! and be torn down. [`BrowserLauncher`] / [`BrowserSession`] capture that
//! surface so the strategy is independent of the engine driving it.
//! [`chromium`] provides the real implementation over the DevTools protocol.

pub mod cdp;
pub mod chromium;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

pub use chromium::ChromiumLauncher;

/// A network request held by the browser until we abort or continue it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausedRequest {
    /// Engine-assigned id used to release the request.
    pub id: String,
    pub url: String,
    /// Headers exactly as the page's player chose them.
    pub headers: HashMap<String, String>,
}

impl PausedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Something observed on the page after navigation started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// A request matching the interception pattern is waiting.
    RequestPaused(PausedRequest),
    /// The document finished parsing (`DOMContentLoaded`).
    DomContentLoaded,
    /// Navigation could not complete (DNS, TLS, HTTP error page, ...).
    NavigationFailed(String),
}

/// One isolated browsing context.
///
/// Implementations must release their OS resources when dropped, so a
/// cancelled resolution cannot leak a browser process; [`close`] is the
/// orderly path.
///
/// [`close`]: BrowserSession::close
#[async_trait]
pub trait BrowserSession: Send {
    /// Pause every request whose URL matches `url_pattern` (`*` wildcard).
    async fn intercept(&mut self, url_pattern: &str) -> Result<()>;

    /// Start navigating to `url`. Returns once the navigation is issued;
    /// progress is reported through [`next_event`](Self::next_event).
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Wait for the next page event. `None` once the session is gone.
    async fn next_event(&mut self) -> Option<PageEvent>;

    /// Abort a paused request so no response bytes are fetched.
    async fn abort_request(&mut self, request_id: &str) -> Result<()>;

    /// Let a paused request proceed unmodified.
    async fn continue_request(&mut self, request_id: &str) -> Result<()>;

    /// Shut the session and its process down.
    async fn close(&mut self) -> Result<()>;
}

/// Starts fresh browsing sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a new session presenting `user_agent`. Nothing is shared
    /// with previously launched sessions.
    async fn launch(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>>;
}
