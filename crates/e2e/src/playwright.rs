//! Playwright browser automation
//!
//! Each page is backed by its own `node` process running `driver.js`. The
//! runner sends one JSON request per line on stdin and reads one JSON
//! response per line from stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::{Launcher, Page, WaitState};

const DRIVER_SCRIPT: &str = include_str!("driver.js");

/// Extra time granted to a driver round trip beyond the browser timeout
const ROUND_TRIP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Bound on every wait, navigation and action
    pub timeout: Duration,

    /// How long to wait for the browser to launch
    pub launch_timeout: Duration,

    /// `node_modules` directory containing `playwright` (None = ./node_modules)
    pub node_modules: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(60),
            node_modules: None,
        }
    }
}

impl PlaywrightConfig {
    fn node_path(&self) -> PathBuf {
        self.node_modules
            .clone()
            .unwrap_or_else(|| PathBuf::from("node_modules"))
    }
}

/// Starts one driver process per page
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.node_path())?;
        Ok(Self { config })
    }

    /// Check that node can resolve the playwright package
    fn check_playwright_installed(node_path: &Path) -> E2eResult<()> {
        let status = Command::new("node")
            .args(["-e", "require.resolve('playwright')"])
            .env("NODE_PATH", node_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl Launcher for PlaywrightLauncher {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        let page = PlaywrightPage::launch(&self.config).await?;
        Ok(Box::new(page))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverOp<'a> {
    Goto { url: &'a str },
    Fill { selector: &'a str, value: &'a str },
    Click { selector: &'a str },
    WaitForSelector { selector: &'a str, state: WaitState },
    WaitForUrl { url: &'a str },
    InnerText { selector: &'a str },
    Url,
    Screenshot { path: String },
    Close,
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    op: DriverOp<'a>,
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: i64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

impl DriverResponse {
    fn into_result(self, expected_id: u64, what: &str) -> E2eResult<serde_json::Value> {
        if self.id != expected_id as i64 {
            return Err(E2eError::Playwright(format!(
                "driver answered request {} while {} was pending",
                self.id, expected_id
            )));
        }
        if self.ok {
            return Ok(self.value);
        }
        let reason = self.error.unwrap_or_else(|| "unknown driver error".to_string());
        if self.timeout {
            Err(E2eError::Timeout(format!("{} ({})", what, reason)))
        } else {
            Err(E2eError::Playwright(format!("{}: {}", what, reason)))
        }
    }
}

type DriverReader = Box<dyn AsyncRead + Send + Unpin>;
type DriverWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A browser page owned by a dedicated driver process
pub struct PlaywrightPage {
    child: Option<Child>,
    stdin: DriverWriter,
    stdout: Lines<BufReader<DriverReader>>,
    next_id: u64,
    round_trip_timeout: Duration,
    closed: bool,
    _script_dir: Option<tempfile::TempDir>,
}

impl PlaywrightPage {
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        debug!(
            "Launching {} driver: {}",
            config.browser.as_str(),
            script_path.display()
        );

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .env("NODE_PATH", config.node_path())
            .env("AUTHFLOW_BROWSER", config.browser.as_str())
            .env("AUTHFLOW_HEADLESS", if config.headless { "1" } else { "0" })
            .env("AUTHFLOW_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("AUTHFLOW_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .env("AUTHFLOW_TIMEOUT_MS", config.timeout.as_millis().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".to_string()))?;

        let mut page = Self::from_streams(
            Box::new(stdout),
            Box::new(stdin),
            config.timeout + ROUND_TRIP_GRACE,
        );
        page.child = Some(child);
        page._script_dir = Some(script_dir);

        page.await_ready(config.launch_timeout).await?;
        Ok(page)
    }

    /// Page over an already-connected driver transport
    fn from_streams(reader: DriverReader, writer: DriverWriter, round_trip_timeout: Duration) -> Self {
        Self {
            child: None,
            stdin: writer,
            stdout: BufReader::new(reader).lines(),
            next_id: 1,
            round_trip_timeout,
            closed: false,
            _script_dir: None,
        }
    }

    async fn await_ready(&mut self, limit: Duration) -> E2eResult<()> {
        self.read_response(0, limit, "browser launch")
            .await?
            .into_result(0, "browser launch")
            .map(drop)
    }

    /// Read until the response for `id` arrives. Replies to earlier requests
    /// that outlived their own deadline are discarded.
    async fn read_response(&mut self, id: u64, limit: Duration, what: &str) -> E2eResult<DriverResponse> {
        let deadline = tokio::time::Instant::now() + limit;

        loop {
            let line = match tokio::time::timeout_at(deadline, self.stdout.next_line()).await {
                Err(_) => {
                    return Err(E2eError::Timeout(format!("{} (driver unresponsive)", what)));
                }
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    return Err(E2eError::Playwright(format!("driver exited during {}", what)));
                }
                Ok(Err(e)) => return Err(e.into()),
            };

            let response: DriverResponse = serde_json::from_str(&line).map_err(|e| {
                E2eError::Playwright(format!("malformed driver response {:?}: {}", line, e))
            })?;

            if response.id >= 0 && (response.id as u64) < id {
                debug!("Discarding stale driver response for request {}", response.id);
                continue;
            }
            return Ok(response);
        }
    }

    async fn request(&mut self, op: DriverOp<'_>, what: &str) -> E2eResult<serde_json::Value> {
        if self.closed {
            return Err(E2eError::Playwright(format!("{}: page is closed", what)));
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&DriverRequest { id, op })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let response = self.read_response(id, self.round_trip_timeout, what).await?;
        response.into_result(id, what)
    }

    async fn request_string(&mut self, op: DriverOp<'_>, what: &str) -> E2eResult<String> {
        match self.request(op, what).await? {
            serde_json::Value::String(s) => Ok(s),
            other => Err(E2eError::Playwright(format!(
                "{}: expected a string, got {}",
                what, other
            ))),
        }
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.request(DriverOp::Goto { url }, &format!("navigate {}", url))
            .await
            .map(drop)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        self.request(DriverOp::Fill { selector, value }, &format!("fill {}", selector))
            .await
            .map(drop)
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        self.request(DriverOp::Click { selector }, &format!("click {}", selector))
            .await
            .map(drop)
    }

    async fn wait_for_selector(&mut self, selector: &str, state: WaitState) -> E2eResult<()> {
        let what = format!("{} to be {}", selector, state.as_str());
        self.request(DriverOp::WaitForSelector { selector, state }, &what)
            .await
            .map(drop)
    }

    async fn wait_for_timeout(&mut self, ms: u64) -> E2eResult<()> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn wait_for_url(&mut self, url: &str) -> E2eResult<()> {
        self.request(DriverOp::WaitForUrl { url }, &format!("url {}", url))
            .await
            .map(drop)
    }

    async fn inner_text(&mut self, selector: &str) -> E2eResult<String> {
        self.request_string(DriverOp::InnerText { selector }, &format!("text of {}", selector))
            .await
    }

    async fn url(&mut self) -> E2eResult<String> {
        self.request_string(DriverOp::Url, "current url").await
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let path = path.to_string_lossy().into_owned();
        self.request(DriverOp::Screenshot { path }, "screenshot")
            .await
            .map(drop)
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        if let Err(e) = self.request(DriverOp::Close, "close").await {
            warn!("Driver did not close cleanly: {}", e);
        }
        self.closed = true;

        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        match tokio::time::timeout(ROUND_TRIP_GRACE, child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                child.kill().await?;
                Ok(())
            }
        }
    }
}
