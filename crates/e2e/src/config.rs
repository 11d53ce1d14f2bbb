//! Runner configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::scenario::ScenarioOptions;
use crate::server::ServerConfig;

/// Application address used when neither a base URL nor a server is given
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Address of an already-running application. Ignored when `server` is set.
    pub base_url: String,

    /// Spawn the application instead of using `base_url`
    pub server: Option<ServerConfig>,

    pub playwright: PlaywrightConfig,

    pub scenarios: ScenarioOptions,

    /// Timeout for direct API calls
    pub api_timeout: Duration,

    /// Maximum number of scenarios running at once
    pub jobs: usize,

    pub screenshot_on_failure: bool,

    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            server: None,
            playwright: PlaywrightConfig::default(),
            scenarios: ScenarioOptions::default(),
            api_timeout: Duration::from_secs(10),
            jobs: 1,
            screenshot_on_failure: true,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

impl RunnerConfig {
    /// Load from `AUTHFLOW_*` environment variables on top of the defaults
    pub fn from_env() -> E2eResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Whether the environment names an application to test at all
    pub fn env_has_target() -> bool {
        ["AUTHFLOW_BASE_URL", "AUTHFLOW_SERVER_CMD"]
            .iter()
            .any(|key| std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> E2eResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("AUTHFLOW_BASE_URL") {
            config.base_url = url;
        }
        if let Some(cmd) = lookup("AUTHFLOW_SERVER_CMD") {
            let mut server = ServerConfig::from_command_line(&cmd)?;
            if let Some(path) = lookup("AUTHFLOW_HEALTH_PATH") {
                server.health_path = path;
            }
            config.server = Some(server);
        }
        if let Some(browser) = lookup("AUTHFLOW_BROWSER") {
            config.playwright.browser = browser.parse()?;
        }
        if let Some(headless) = lookup("AUTHFLOW_HEADLESS") {
            config.playwright.headless = parse_bool("AUTHFLOW_HEADLESS", &headless)?;
        }
        if let Some(ms) = lookup("AUTHFLOW_TIMEOUT_MS") {
            config.playwright.timeout = Duration::from_millis(parse_num("AUTHFLOW_TIMEOUT_MS", &ms)?);
        }
        if let Some(dir) = lookup("AUTHFLOW_NODE_MODULES") {
            config.playwright.node_modules = Some(PathBuf::from(dir));
        }
        if let Some(ms) = lookup("AUTHFLOW_SETTLE_MS") {
            config.scenarios.settle_ms = parse_num("AUTHFLOW_SETTLE_MS", &ms)?;
        }
        if let Some(jobs) = lookup("AUTHFLOW_JOBS") {
            config.jobs = parse_num("AUTHFLOW_JOBS", &jobs)?.max(1) as usize;
        }
        if let Some(dir) = lookup("AUTHFLOW_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

fn parse_num(key: &str, value: &str) -> E2eResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| E2eError::Config(format!("{} must be a number, got {:?}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> E2eResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(E2eError::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playwright::Browser;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = RunnerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.server.is_none());
        assert_eq!(config.jobs, 1);
        assert_eq!(config.scenarios.settle_ms, 0);
        assert_eq!(config.playwright.timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_overrides() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("AUTHFLOW_BASE_URL", "http://app:9000/"),
            ("AUTHFLOW_BROWSER", "firefox"),
            ("AUTHFLOW_HEADLESS", "false"),
            ("AUTHFLOW_TIMEOUT_MS", "5000"),
            ("AUTHFLOW_SETTLE_MS", "2000"),
            ("AUTHFLOW_JOBS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://app:9000/");
        assert_eq!(config.playwright.browser, Browser::Firefox);
        assert!(!config.playwright.headless);
        assert_eq!(config.playwright.timeout, Duration::from_millis(5000));
        assert_eq!(config.scenarios.settle_ms, 2000);
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn server_command_enables_spawning() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("AUTHFLOW_SERVER_CMD", "uvicorn app.main:app --port {port}"),
            ("AUTHFLOW_HEALTH_PATH", "/health"),
        ]))
        .unwrap();

        let server = config.server.expect("server config");
        assert_eq!(server.command[0], "uvicorn");
        assert_eq!(server.health_path, "/health");
    }

    #[test]
    fn rejects_malformed_numbers() {
        let err = RunnerConfig::from_lookup(lookup(&[("AUTHFLOW_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(matches!(err, E2eError::Config(msg) if msg.contains("AUTHFLOW_TIMEOUT_MS")));
    }
}
