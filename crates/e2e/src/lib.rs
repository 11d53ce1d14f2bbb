//! Authflow E2E Test Framework
//!
//! Browser-driven end-to-end tests for a web application's registration and
//! login flows. This crate:
//! - Optionally spawns the application as a subprocess
//! - Controls Playwright through a small line-delimited JSON driver
//! - Provisions fixtures through the application's HTTP API
//! - Runs a fixed catalog of scenarios and reports results as JSON
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> ServerHandle (optional)            │
//! │    ├── launcher.new_page() -> Box<dyn Page>                 │
//! │    └── run_scenario(&Scenario) -> TestResult                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario                                                   │
//! │    ├── setup: [SetupAction]   (POST /auth/register)         │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { path }                              │
//! │          ├── fill { selector, value }                       │
//! │          ├── click { selector }                             │
//! │          ├── wait { selector, state }                       │
//! │          ├── wait_for_url { path }                          │
//! │          └── assert_text_contains / assert_url              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod server;

pub use config::RunnerConfig;
pub use error::{E2eError, E2eResult};
pub use page::{Launcher, Page, WaitState};
pub use runner::{TestResult, TestRunner, TestSuiteResult};
pub use scenario::{Scenario, Step};
