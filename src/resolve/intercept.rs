//! Manifest interception strategy.
//!
//! Renders an embed page in a fresh headless session, pauses every request
//! for an HLS manifest, and keeps the first one: its URL plus the
//! `Referer`/`User-Agent` the player sent. That request is aborted so no
//! media is fetched; later manifest requests are let through untouched.
//!
//! Time budget per call: navigation timeout (until `DOMContentLoaded`) plus
//! a settle delay for players that request the manifest from a callback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::types::ResolutionResult;
use crate::browser::{BrowserLauncher, BrowserSession, PageEvent, PausedRequest};
use crate::error::ResolveError;
use crate::fingerprint::DEFAULT_USER_AGENT;

/// Pattern handed to the browser; [`is_manifest_url`] makes the final call.
pub const MANIFEST_URL_PATTERN: &str = "*.m3u8*";

/// Timing and concurrency limits for interception.
#[derive(Debug, Clone)]
pub struct InterceptSettings {
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    /// Upper bound on simultaneously running browser sessions.
    pub max_sessions: usize,
    pub user_agent: String,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
            max_sessions: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub struct InterceptionStrategy {
    launcher: Arc<dyn BrowserLauncher>,
    sessions: Semaphore,
    settings: InterceptSettings,
}

impl InterceptionStrategy {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, settings: InterceptSettings) -> Self {
        let sessions = Semaphore::new(settings.max_sessions.max(1));
        Self {
            launcher,
            sessions,
            settings,
        }
    }

    pub fn settings(&self) -> &InterceptSettings {
        &self.settings
    }

    /// Capture the manifest an embed page requests.
    ///
    /// `Ok(None)` means the page never asked for a manifest within the time
    /// budget (or failed to load). `Err` is reserved for not being able to
    /// start a browser at all.
    #[instrument(skip(self), fields(url = %embed_url))]
    pub async fn resolve(&self, embed_url: &str) -> Result<Option<ResolutionResult>, ResolveError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|e| ResolveError::BrowserLaunch(e.to_string()))?;

        let mut session = self
            .launcher
            .launch(&self.settings.user_agent)
            .await
            .map_err(|e| ResolveError::BrowserLaunch(format!("{e:#}")))?;

        let captured = self.capture(session.as_mut(), embed_url).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Browser session close failed");
        }
        drop(session);

        match captured {
            Ok(Some(request)) => {
                info!(manifest = %request.url, "Captured manifest request");
                Ok(Some(self.build_result(request, embed_url)))
            }
            Ok(None) => {
                warn!("No manifest request observed");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Interception failed");
                Ok(None)
            }
        }
    }

    async fn capture(
        &self,
        session: &mut dyn BrowserSession,
        embed_url: &str,
    ) -> Result<Option<PausedRequest>> {
        session.intercept(MANIFEST_URL_PATTERN).await?;
        session.navigate(embed_url).await?;

        let mut captured = None;

        let navigation_deadline = Instant::now() + self.settings.navigation_timeout;
        let loaded = loop {
            match timeout_at(navigation_deadline, session.next_event()).await {
                Err(_) => {
                    warn!(timeout = ?self.settings.navigation_timeout, "Navigation timed out");
                    break false;
                }
                Ok(None) => return Ok(captured),
                Ok(Some(PageEvent::DomContentLoaded)) => break true,
                Ok(Some(PageEvent::NavigationFailed(reason))) => {
                    warn!(%reason, "Navigation failed");
                    break false;
                }
                Ok(Some(PageEvent::RequestPaused(request))) => {
                    release(session, request, &mut captured).await;
                }
            }
        };

        if loaded {
            debug!(delay = ?self.settings.settle_delay, "Page ready, waiting for late manifest requests");
            let settle_deadline = Instant::now() + self.settings.settle_delay;
            while let Ok(Some(event)) = timeout_at(settle_deadline, session.next_event()).await {
                if let PageEvent::RequestPaused(request) = event {
                    release(session, request, &mut captured).await;
                }
            }
        }

        Ok(captured)
    }

    fn build_result(&self, request: PausedRequest, embed_url: &str) -> ResolutionResult {
        let referer = request
            .header("Referer")
            .map_or_else(|| embed_url.to_string(), str::to_string);
        let user_agent = request
            .header("User-Agent")
            .map_or_else(|| self.settings.user_agent.clone(), str::to_string);
        ResolutionResult::intercepted(request.url, referer, user_agent)
    }
}

/// Abort the first manifest request and keep it; continue everything else.
async fn release(
    session: &mut dyn BrowserSession,
    request: PausedRequest,
    captured: &mut Option<PausedRequest>,
) {
    if captured.is_none() && is_manifest_url(&request.url) {
        debug!(url = %request.url, "Aborting first manifest request");
        if let Err(e) = session.abort_request(&request.id).await {
            debug!(error = %e, "Abort failed (request already gone?)");
        }
        *captured = Some(request);
        return;
    }

    debug!(url = %request.url, "Continuing request");
    if let Err(e) = session.continue_request(&request.id).await {
        debug!(error = %e, "Continue failed (request already gone?)");
    }
}

/// Returns `true` if the URL's path ends with `.m3u8`, ignoring query,
/// fragment and case.
pub fn is_manifest_url(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    path.to_ascii_lowercase().ends_with(".m3u8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::types::Strategy;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the scripted session recorded.
    #[derive(Default)]
    struct Journal {
        aborted: Mutex<Vec<String>>,
        continued: Mutex<Vec<String>>,
        navigated: Mutex<Vec<String>>,
        closed: AtomicBool,
        live: AtomicUsize,
    }

    /// Replays a fixed event script, then goes quiet (or ends).
    struct ScriptedSession {
        script: VecDeque<(Duration, PageEvent)>,
        end_after_script: bool,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        async fn intercept(&mut self, url_pattern: &str) -> Result<()> {
            assert_eq!(url_pattern, MANIFEST_URL_PATTERN);
            Ok(())
        }

        async fn navigate(&mut self, url: &str) -> Result<()> {
            self.journal.navigated.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn next_event(&mut self) -> Option<PageEvent> {
            match self.script.pop_front() {
                Some((delay, event)) => {
                    tokio::time::sleep(delay).await;
                    Some(event)
                }
                None if self.end_after_script => None,
                None => std::future::pending().await,
            }
        }

        async fn abort_request(&mut self, request_id: &str) -> Result<()> {
            self.journal.aborted.lock().unwrap().push(request_id.to_string());
            Ok(())
        }

        async fn continue_request(&mut self, request_id: &str) -> Result<()> {
            self.journal.continued.lock().unwrap().push(request_id.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.journal.closed.store(true, Ordering::SeqCst);
            self.journal.live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedLauncher {
        script: Vec<(Duration, PageEvent)>,
        end_after_script: bool,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl BrowserLauncher for ScriptedLauncher {
        async fn launch(&self, _user_agent: &str) -> Result<Box<dyn BrowserSession>> {
            self.journal.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                script: self.script.clone().into(),
                end_after_script: self.end_after_script,
                journal: Arc::clone(&self.journal),
            }))
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl BrowserLauncher for FailingLauncher {
        async fn launch(&self, _user_agent: &str) -> Result<Box<dyn BrowserSession>> {
            anyhow::bail!("no chromium here")
        }
    }

    fn paused(id: &str, url: &str, headers: &[(&str, &str)]) -> PageEvent {
        PageEvent::RequestPaused(PausedRequest {
            id: id.to_string(),
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    fn strategy(script: Vec<(Duration, PageEvent)>) -> (InterceptionStrategy, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let launcher = ScriptedLauncher {
            script,
            end_after_script: false,
            journal: Arc::clone(&journal),
        };
        (
            InterceptionStrategy::new(Arc::new(launcher), InterceptSettings::default()),
            journal,
        )
    }

    const EMBED: &str = "https://embed.example/e/abc123";

    #[tokio::test(start_paused = true)]
    async fn test_single_manifest_captured_with_referer() {
        let (strategy, journal) = strategy(vec![
            (Duration::from_millis(200), PageEvent::DomContentLoaded),
            (
                Duration::from_secs(1),
                paused(
                    "r1",
                    "https://cdn.example/hls/master.m3u8?token=x",
                    &[("Referer", "https://embed.example/"), ("User-Agent", "PlayerUA")],
                ),
            ),
        ]);

        let start = Instant::now();
        let result = strategy.resolve(EMBED).await.unwrap().unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result.strategy, Strategy::Intercepted);
        assert_eq!(result.url, "https://cdn.example/hls/master.m3u8?token=x");
        assert_eq!(result.headers["Referer"], "https://embed.example/");
        assert_eq!(result.headers["User-Agent"], "PlayerUA");
        assert_eq!(result.headers.len(), 2);
        assert_eq!(*journal.aborted.lock().unwrap(), vec!["r1"]);
        assert!(elapsed <= Duration::from_secs(35));
        assert!(journal.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_manifest_continued_not_captured() {
        let (strategy, journal) = strategy(vec![
            (
                Duration::from_millis(100),
                paused("r1", "https://cdn.example/a/master.m3u8", &[("referer", "https://embed.example/")]),
            ),
            (Duration::from_millis(100), PageEvent::DomContentLoaded),
            (
                Duration::from_millis(500),
                paused("r2", "https://cdn.example/b/index.m3u8", &[("referer", "https://other.example/")]),
            ),
        ]);

        let result = strategy.resolve(EMBED).await.unwrap().unwrap();

        assert_eq!(result.url, "https://cdn.example/a/master.m3u8");
        assert_eq!(result.headers["Referer"], "https://embed.example/");
        assert_eq!(*journal.aborted.lock().unwrap(), vec!["r1"]);
        assert_eq!(*journal.continued.lock().unwrap(), vec!["r2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_manifest_requests_continued() {
        let (strategy, journal) = strategy(vec![
            (Duration::ZERO, paused("js", "https://embed.example/player.m3u8.js", &[])),
            (Duration::ZERO, PageEvent::DomContentLoaded),
            (Duration::ZERO, paused("m", "https://cdn.example/MASTER.M3U8", &[])),
        ]);

        let result = strategy.resolve(EMBED).await.unwrap().unwrap();
        assert_eq!(result.url, "https://cdn.example/MASTER.M3U8");
        assert_eq!(*journal.continued.lock().unwrap(), vec!["js"]);
        assert_eq!(*journal.aborted.lock().unwrap(), vec!["m"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_headers_fall_back_to_embed_and_default_agent() {
        let (strategy, _journal) = strategy(vec![
            (Duration::ZERO, PageEvent::DomContentLoaded),
            (Duration::ZERO, paused("r1", "https://cdn.example/master.m3u8", &[])),
        ]);

        let result = strategy.resolve(EMBED).await.unwrap().unwrap();
        assert_eq!(result.headers["Referer"], EMBED);
        assert_eq!(result.headers["User-Agent"], DEFAULT_USER_AGENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_manifest_returns_none_after_budget() {
        let (strategy, journal) =
            strategy(vec![(Duration::from_secs(2), PageEvent::DomContentLoaded)]);

        let start = Instant::now();
        let result = strategy.resolve(EMBED).await.unwrap();
        let elapsed = start.elapsed();

        assert!(result.is_none());
        // 2s to DOMContentLoaded + 5s settle delay
        assert!(elapsed >= Duration::from_secs(7));
        assert!(elapsed <= Duration::from_secs(35));
        assert!(journal.closed.load(Ordering::SeqCst));
        assert_eq!(journal.live.load(Ordering::SeqCst), 0);
        assert_eq!(*journal.navigated.lock().unwrap(), vec![EMBED]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout_skips_settle_and_closes() {
        let (strategy, journal) = strategy(vec![]);

        let start = Instant::now();
        let result = strategy.resolve(EMBED).await.unwrap();

        assert!(result.is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(35));
        assert!(journal.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_keeps_earlier_capture() {
        let (strategy, journal) = strategy(vec![
            (Duration::ZERO, paused("r1", "https://cdn.example/master.m3u8", &[])),
            (Duration::ZERO, PageEvent::NavigationFailed("net::ERR_ABORTED".to_string())),
        ]);

        let result = strategy.resolve(EMBED).await.unwrap();
        assert!(result.is_some());
        assert!(journal.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_ending_early_returns_capture_so_far() {
        let journal = Arc::new(Journal::default());
        let launcher = ScriptedLauncher {
            script: vec![(Duration::ZERO, paused("r1", "https://cdn.example/x.m3u8", &[]))],
            end_after_script: true,
            journal: Arc::clone(&journal),
        };
        let strategy = InterceptionStrategy::new(Arc::new(launcher), InterceptSettings::default());

        let result = strategy.resolve(EMBED).await.unwrap().unwrap();
        assert_eq!(result.url, "https://cdn.example/x.m3u8");
        assert!(journal.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_launch_failure_is_hard_error() {
        let strategy = InterceptionStrategy::new(Arc::new(FailingLauncher), InterceptSettings::default());
        let err = strategy.resolve(EMBED).await.unwrap_err();
        assert!(matches!(err, ResolveError::BrowserLaunch(msg) if msg.contains("no chromium")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_bounded_by_semaphore() {
        struct CountingLauncher {
            live: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        struct CountingSession {
            live: Arc<AtomicUsize>,
            done: bool,
        }

        #[async_trait]
        impl BrowserSession for CountingSession {
            async fn intercept(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            async fn navigate(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            async fn next_event(&mut self) -> Option<PageEvent> {
                if self.done {
                    return None;
                }
                self.done = true;
                tokio::time::sleep(Duration::from_secs(1)).await;
                Some(PageEvent::DomContentLoaded)
            }
            async fn abort_request(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            async fn continue_request(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            async fn close(&mut self) -> Result<()> {
                self.live.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        #[async_trait]
        impl BrowserLauncher for CountingLauncher {
            async fn launch(&self, _: &str) -> Result<Box<dyn BrowserSession>> {
                let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                Ok(Box::new(CountingSession {
                    live: Arc::clone(&self.live),
                    done: false,
                }))
            }
        }

        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let launcher = CountingLauncher {
            live: Arc::clone(&live),
            peak: Arc::clone(&peak),
        };
        let strategy = Arc::new(InterceptionStrategy::new(
            Arc::new(launcher),
            InterceptSettings {
                max_sessions: 2,
                ..InterceptSettings::default()
            },
        ));

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let strategy = Arc::clone(&strategy);
                tokio::spawn(async move { strategy.resolve(&format!("https://e.example/{i}")).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_none());
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_is_manifest_url() {
        assert!(is_manifest_url("https://cdn.example/master.m3u8"));
        assert!(is_manifest_url("https://cdn.example/master.m3u8?token=abc&e=1"));
        assert!(is_manifest_url("https://cdn.example/Index.M3U8#t=1"));
        assert!(is_manifest_url("/relative/playlist.m3u8?x"));
        assert!(!is_manifest_url("https://cdn.example/seg-1.ts"));
        assert!(!is_manifest_url("https://cdn.example/player.js?src=a.m3u8"));
        assert!(!is_manifest_url("https://cdn.example/master.m3u8.js"));
    }
}
