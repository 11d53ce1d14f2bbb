//! Authflow E2E runner - command-line entry point

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use authflow_e2e::playwright::{Browser, PlaywrightConfig};
use authflow_e2e::scenario::ScenarioOptions;
use authflow_e2e::server::ServerConfig;
use authflow_e2e::{RunnerConfig, TestRunner, TestSuiteResult};

#[derive(Parser, Debug)]
#[command(name = "authflow-e2e")]
#[command(author, version, about = "Browser E2E tests for registration and login flows")]
struct Args {
    /// Base URL of a running application
    #[arg(long, env = "AUTHFLOW_BASE_URL", default_value = authflow_e2e::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Command that starts the application; `{port}` is replaced with the chosen port
    #[arg(long, env = "AUTHFLOW_SERVER_CMD")]
    server_cmd: Option<String>,

    /// Port for the spawned application (0 = auto)
    #[arg(long, default_value = "0")]
    port: u16,

    /// Path polled until the spawned application is up
    #[arg(long, env = "AUTHFLOW_HEALTH_PATH", default_value = "/login")]
    health_path: String,

    /// Run only the scenario with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, env = "AUTHFLOW_BROWSER", default_value = "chromium")]
    browser: Browser,

    /// Run the browser without a window
    #[arg(
        long,
        env = "AUTHFLOW_HEADLESS",
        default_value = "true",
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    headless: bool,

    /// Show the browser window (same as `--headless false`)
    #[arg(long)]
    headed: bool,

    /// Timeout for every browser wait, in milliseconds
    #[arg(long, env = "AUTHFLOW_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Directory containing the playwright package
    #[arg(long, env = "AUTHFLOW_NODE_MODULES")]
    node_modules: Option<PathBuf>,

    /// Fixed delay after registration succeeds (0 = wait for the redirect only)
    #[arg(long, env = "AUTHFLOW_SETTLE_MS", default_value = "0")]
    settle_ms: u64,

    /// Scenarios to run concurrently
    #[arg(short, long, env = "AUTHFLOW_JOBS", default_value = "1")]
    jobs: usize,

    /// Skip screenshots of failed scenarios
    #[arg(long)]
    no_screenshots: bool,

    /// Output directory for results
    #[arg(short, long, env = "AUTHFLOW_OUTPUT_DIR", default_value = "test-results")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn runner_config(&self) -> anyhow::Result<RunnerConfig> {
        let server = match &self.server_cmd {
            Some(cmd) => Some(ServerConfig {
                port: (self.port != 0).then_some(self.port),
                health_path: self.health_path.clone(),
                ..ServerConfig::from_command_line(cmd)?
            }),
            None => None,
        };

        Ok(RunnerConfig {
            base_url: self.base_url.clone(),
            server,
            playwright: PlaywrightConfig {
                browser: self.browser,
                headless: self.headless && !self.headed,
                timeout: Duration::from_millis(self.timeout_ms),
                node_modules: self.node_modules.clone(),
                ..Default::default()
            },
            scenarios: ScenarioOptions {
                settle_ms: self.settle_ms,
            },
            jobs: self.jobs.max(1),
            screenshot_on_failure: !self.no_screenshots,
            output_dir: self.output.clone(),
            ..Default::default()
        })
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs);

    match run(args).await {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let config = args.runner_config()?;

    if args.list {
        for scenario in authflow_e2e::scenario::catalog(&config.scenarios) {
            println!("{:<26} [{}] {}", scenario.name, scenario.tags.join(","), scenario.description);
        }
        return Ok(true);
    }

    let mut runner = TestRunner::new(config)?;

    let results = if let Some(name) = &args.name {
        let started_at = chrono::Utc::now();
        let result = runner.run_test(name).await?;
        TestSuiteResult::from_results(started_at, result.duration_ms, vec![result])
    } else if let Some(tag) = &args.tag {
        runner.run_tagged(tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&results)?;
    runner.stop_server()?;

    info!("{}/{} scenario(s) passed", results.passed, results.total);
    Ok(results.success())
}
