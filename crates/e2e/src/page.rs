//! Browser automation seam
//!
//! Scenarios only talk to a [`Page`]. Every call blocks the scenario until the
//! browser reaches the requested state or the configured timeout elapses, in
//! which case the call fails with [`E2eError::Timeout`](crate::E2eError::Timeout).

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// A single browser page (one isolated browser context)
#[async_trait]
pub trait Page: Send {
    /// Navigate to an absolute URL
    async fn navigate(&mut self, url: &str) -> E2eResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&mut self, selector: &str) -> E2eResult<()>;

    async fn wait_for_selector(&mut self, selector: &str, state: WaitState) -> E2eResult<()>;

    async fn wait_for_timeout(&mut self, ms: u64) -> E2eResult<()>;

    /// Wait until the page URL equals `url`
    async fn wait_for_url(&mut self, url: &str) -> E2eResult<()>;

    async fn inner_text(&mut self, selector: &str) -> E2eResult<String>;

    /// Current page URL
    async fn url(&mut self) -> E2eResult<String>;

    /// Full-page screenshot written to `path`
    async fn screenshot(&mut self, path: &Path) -> E2eResult<()>;

    async fn close(&mut self) -> E2eResult<()>;
}

/// Hands out a fresh page per scenario
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>>;
}
