//! Main test runner that orchestrates the server, pages and scenarios

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::RunnerConfig;
use crate::error::{E2eError, E2eResult};
use crate::page::{Launcher, Page};
use crate::playwright::PlaywrightLauncher;
use crate::scenario::{self, Phase, Scenario, SetupAction};
use crate::server::ServerHandle;

/// Result of a single setup action or UI step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub failed_phase: Option<Phase>,
    pub setup: Vec<StepResult>,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

impl TestResult {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            failed_phase: None,
            setup: Vec::new(),
            steps: Vec::new(),
            error: None,
            screenshot_path: None,
        }
    }

    fn fail(&mut self, phase: Phase, err: &E2eError) {
        self.failed_phase = Some(phase);
        self.error = Some(err.to_string());
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(started_at: DateTime<Utc>, duration_ms: u64, results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,

    launcher: Box<dyn Launcher>,

    /// Running server handle (if any)
    server: Option<ServerHandle>,

    base_url: String,
}

impl TestRunner {
    /// Create a runner driving real browsers through Playwright
    pub fn new(config: RunnerConfig) -> E2eResult<Self> {
        let launcher = PlaywrightLauncher::new(config.playwright.clone())?;
        Ok(Self::with_launcher(config, Box::new(launcher)))
    }

    pub fn with_launcher(config: RunnerConfig, launcher: Box<dyn Launcher>) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            launcher,
            server: None,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start the application if the config asks for it
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(());
        }
        let Some(server_config) = self.config.server.clone() else {
            return Ok(());
        };

        let server = ServerHandle::spawn(server_config).await?;
        self.base_url = server.base_url().to_string();
        self.server = Some(server);
        Ok(())
    }

    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Fresh scenario catalog with newly generated users
    pub fn catalog(&self) -> Vec<Scenario> {
        scenario::catalog(&self.config.scenarios)
    }

    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let scenarios = self.catalog();
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios: Vec<Scenario> = self
            .catalog()
            .into_iter()
            .filter(|s| s.has_tag(tag))
            .collect();
        if scenarios.is_empty() {
            return Err(E2eError::ScenarioNotFound(format!("no scenario tagged {:?}", tag)));
        }
        self.run_scenarios(&scenarios).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let scenario = self
            .catalog()
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;

        self.start_server().await?;
        Ok(self.run_scenario(&scenario).await)
    }

    /// Run scenarios, at most `jobs` at a time. Results keep input order.
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        self.start_server().await?;

        let started_at = Utc::now();
        let start = Instant::now();
        let jobs = self.config.jobs.max(1);

        info!("Running {} scenario(s) against {} (jobs: {})", scenarios.len(), self.base_url, jobs);

        let this: &Self = self;
        let results: Vec<TestResult> = stream::iter(scenarios)
            .map(|s| this.run_scenario(s))
            .buffered(jobs)
            .collect()
            .await;

        let suite = TestSuiteResult::from_results(started_at, start.elapsed().as_millis() as u64, results);

        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );

        Ok(suite)
    }

    /// Run one scenario to completion. Failures are captured in the result.
    pub async fn run_scenario(&self, scenario: &Scenario) -> TestResult {
        let start = Instant::now();
        scenario::describe(scenario);

        let mut result = TestResult::pending(&scenario.name);

        match self.run_setup(scenario, &mut result).await {
            Ok(()) => self.run_exercise(scenario, &mut result).await,
            Err(e) => result.fail(Phase::Setup, &e),
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result.success = result.error.is_none();

        match &result.error {
            None => info!("✓ {} ({} ms)", result.name, result.duration_ms),
            Some(e) => error!("✗ {} - {}", result.name, e),
        }

        result
    }

    async fn run_setup(&self, scenario: &Scenario, result: &mut TestResult) -> E2eResult<()> {
        if scenario.setup.is_empty() {
            return Ok(());
        }

        let api = ApiClient::new(&self.base_url, self.config.api_timeout)?;

        for action in &scenario.setup {
            let start = Instant::now();
            let outcome = match action {
                SetupAction::RegisterViaApi(req) => api.register(req).await,
            };

            result.setup.push(StepResult {
                step_name: action.name(),
                success: outcome.is_ok(),
                duration_ms: start.elapsed().as_millis() as u64,
                error: outcome.as_ref().err().map(|e| e.to_string()),
            });
            outcome?;
        }

        Ok(())
    }

    async fn run_exercise(&self, scenario: &Scenario, result: &mut TestResult) {
        let mut page = match self.launcher.new_page().await {
            Ok(page) => page,
            Err(e) => {
                result.fail(Phase::Exercise, &e);
                return;
            }
        };

        for step in &scenario.steps {
            let start = Instant::now();
            let outcome = step.execute(page.as_mut(), &self.base_url).await;

            result.steps.push(StepResult {
                step_name: step.name(),
                success: outcome.is_ok(),
                duration_ms: start.elapsed().as_millis() as u64,
                error: outcome.as_ref().err().map(|e| e.to_string()),
            });

            if let Err(e) = outcome {
                result.fail(Phase::Exercise, &e);
                if self.config.screenshot_on_failure {
                    result.screenshot_path = self.capture_failure(&scenario.name, page.as_mut()).await;
                }
                break;
            }
        }

        if let Err(e) = page.close().await {
            warn!("Failed to close page for {}: {}", scenario.name, e);
        }
    }

    async fn capture_failure(&self, name: &str, page: &mut dyn Page) -> Option<PathBuf> {
        let path = self
            .config
            .output_dir
            .join("screenshots")
            .join(format!("{}.png", name));

        match page.screenshot(&path).await {
            Ok(()) => {
                debug!("Failure screenshot: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not capture screenshot for {}: {}", name, e);
                None
            }
        }
    }

    /// Write results to `<output_dir>/test-results.json`
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}
