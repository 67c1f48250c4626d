//! Chromium-backed browsing sessions.
//!
//! Every session is its own headless Chromium process with a throwaway
//! profile directory, so no cookies, cache or storage survive between
//! resolutions. The process is spawned with `kill_on_drop`, which makes
//! dropping a [`ChromiumSession`] (including on cancellation) enough to
//! reclaim it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::cdp::{CdpConnection, CdpEvent};
use super::{BrowserLauncher, BrowserSession, PageEvent, PausedRequest};

/// Executable names searched on `PATH`, in preference order.
const CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "microsoft-edge",
    "brave-browser",
];

/// Install locations that are usually not on `PATH`.
const WELL_KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    "/snap/bin/chromium",
];

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

/// Find a Chromium-family browser on this machine.
pub fn find_chromium() -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .or_else(|| {
            WELL_KNOWN_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
        })
}

/// Launches one headless Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    extra_args: Vec<String>,
    launch_timeout: Duration,
    command_timeout: Duration,
}

impl ChromiumLauncher {
    /// Use `executable`, or discover one at launch time when `None`.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable,
            extra_args: Vec::new(),
            launch_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
        }
    }

    /// Additional command line switches (e.g. `--no-sandbox` in containers).
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// How long to wait for the DevTools endpoint after spawning.
    #[must_use]
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    fn executable(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => match which::which(path) {
                Ok(found) => Ok(found),
                Err(_) => bail!("Configured browser {} not found", path.display()),
            },
            None => find_chromium().ok_or_else(|| {
                anyhow!("No Chromium-based browser found (tried {})", CANDIDATES.join(", "))
            }),
        }
    }

    fn command(&self, executable: &Path, profile_dir: &Path, user_agent: &str) -> Command {
        let mut cmd = Command::new(executable);
        cmd.args([
            "--headless=new",
            "--remote-debugging-port=0",
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-gpu",
            "--disable-extensions",
            "--disable-background-networking",
            "--disable-sync",
            "--mute-audio",
            "--autoplay-policy=no-user-gesture-required",
            "--window-size=1920,1080",
        ])
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg(format!("--user-agent={user_agent}"))
        .args(&self.extra_args)
        .arg("about:blank")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, user_agent: &str) -> Result<Box<dyn BrowserSession>> {
        let executable = self.executable()?;
        let profile_dir = tempfile::Builder::new()
            .prefix("embedres-profile-")
            .tempdir()
            .context("Failed to create browser profile directory")?;

        let mut child = self
            .command(&executable, profile_dir.path(), user_agent)
            .spawn()
            .with_context(|| format!("Failed to start {}", executable.display()))?;
        debug!(pid = ?child.id(), executable = %executable.display(), "Browser spawned");

        let stderr = child.stderr.take().context("Browser stderr not captured")?;
        let mut lines = BufReader::new(stderr).lines();
        let ws_url = tokio::time::timeout(self.launch_timeout, read_devtools_url(&mut lines))
            .await
            .map_err(|_| anyhow!("Browser did not report a DevTools endpoint within {:?}", self.launch_timeout))??;
        tokio::spawn(drain_stderr(lines));

        let (conn, events) = CdpConnection::connect(&ws_url).await?;
        let conn = Arc::new(conn);

        let target = conn
            .call("Target.createTarget", json!({"url": "about:blank"}), None, self.command_timeout)
            .await?;
        let target_id = target
            .get("targetId")
            .and_then(Value::as_str)
            .context("Target.createTarget returned no targetId")?;

        let attached = conn
            .call(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
                None,
                self.command_timeout,
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .context("Target.attachToTarget returned no sessionId")?
            .to_string();

        conn.call("Page.enable", json!({}), Some(&session_id), self.command_timeout)
            .await?;

        info!(pid = ?child.id(), "Browser session ready");

        Ok(Box::new(ChromiumSession {
            conn,
            events,
            session_id,
            navigation: None,
            command_timeout: self.command_timeout,
            closed: false,
            child,
            _profile_dir: profile_dir,
        }))
    }
}

/// One headless Chromium process with a single attached page.
pub struct ChromiumSession {
    conn: Arc<CdpConnection>,
    events: mpsc::UnboundedReceiver<CdpEvent>,
    session_id: String,
    navigation: Option<JoinHandle<Result<Value>>>,
    command_timeout: Duration,
    closed: bool,
    // Field order matters: the process is killed before its profile
    // directory is removed.
    child: Child,
    _profile_dir: TempDir,
}

impl ChromiumSession {
    async fn page_call(&self, method: &str, params: Value) -> Result<Value> {
        self.conn
            .call(method, params, Some(&self.session_id), self.command_timeout)
            .await
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn intercept(&mut self, url_pattern: &str) -> Result<()> {
        self.page_call(
            "Fetch.enable",
            json!({"patterns": [{"urlPattern": url_pattern, "requestStage": "Request"}]}),
        )
        .await?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let session_id = self.session_id.clone();
        let url = url.to_string();
        // Page.navigate only answers once the document commits; the page
        // may pause requests before that, so it must not block the caller.
        let timeout = self.command_timeout * 6;
        self.navigation = Some(tokio::spawn(async move {
            conn.call("Page.navigate", json!({"url": url}), Some(&session_id), timeout)
                .await
        }));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<PageEvent> {
        loop {
            tokio::select! {
                outcome = wait_navigation(&mut self.navigation) => {
                    self.navigation = None;
                    if let Some(reason) = navigation_error(outcome) {
                        return Some(PageEvent::NavigationFailed(reason));
                    }
                }
                event = self.events.recv() => {
                    let event = event?;
                    if event.session_id.as_deref() != Some(self.session_id.as_str()) {
                        continue;
                    }
                    if let Some(page_event) = translate_event(&event) {
                        return Some(page_event);
                    }
                }
            }
        }
    }

    async fn abort_request(&mut self, request_id: &str) -> Result<()> {
        self.page_call(
            "Fetch.failRequest",
            json!({"requestId": request_id, "errorReason": "Aborted"}),
        )
        .await?;
        Ok(())
    }

    async fn continue_request(&mut self, request_id: &str) -> Result<()> {
        self.page_call("Fetch.continueRequest", json!({"requestId": request_id}))
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(navigation) = self.navigation.take() {
            navigation.abort();
        }
        if let Err(e) = self
            .conn
            .call("Browser.close", json!({}), None, Duration::from_secs(2))
            .await
        {
            debug!(error = %e, "Browser.close failed, killing process");
        }
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "DevTools connection close failed");
        }

        if let Err(e) = self.child.kill().await {
            // Already exited after Browser.close
            trace!(error = %e, "Browser kill");
        }
        debug!("Browser session closed");
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(navigation) = self.navigation.take() {
            navigation.abort();
        }
        if !self.closed {
            warn!("Browser session dropped without close, killing process");
            let _ = self.child.start_kill();
        }
    }
}

async fn wait_navigation(navigation: &mut Option<JoinHandle<Result<Value>>>) -> Result<Value> {
    match navigation {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(anyhow!("Navigation task failed: {e}")),
        },
        None => std::future::pending().await,
    }
}

fn navigation_error(outcome: Result<Value>) -> Option<String> {
    match outcome {
        Ok(result) => result
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
        Err(e) => Some(e.to_string()),
    }
}

fn translate_event(event: &CdpEvent) -> Option<PageEvent> {
    match event.method.as_str() {
        "Fetch.requestPaused" => {
            let params = &event.params;
            let id = params.get("requestId")?.as_str()?.to_string();
            let request = params.get("request")?;
            let url = request.get("url")?.as_str()?.to_string();
            let headers = request
                .get("headers")
                .and_then(Value::as_object)
                .map(|h| {
                    h.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            Some(PageEvent::RequestPaused(PausedRequest { id, url, headers }))
        }
        "Page.domContentEventFired" => Some(PageEvent::DomContentLoaded),
        "Inspector.targetCrashed" => Some(PageEvent::NavigationFailed("page crashed".to_string())),
        _ => None,
    }
}

async fn read_devtools_url(lines: &mut Lines<BufReader<ChildStderr>>) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        if let Some(url) = parse_devtools_line(&line) {
            return Ok(url);
        }
        trace!(line = %line, "browser");
    }
    bail!("Browser exited before reporting a DevTools endpoint")
}

async fn drain_stderr(mut lines: Lines<BufReader<ChildStderr>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(line = %line, "browser");
    }
}

fn parse_devtools_line(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix(DEVTOOLS_PREFIX)
        .map(str::trim)
        .filter(|url| url.starts_with("ws://"))
        .map(str::to_string)
}
