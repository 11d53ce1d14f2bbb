//! Scenario definitions for the registration and login flows
//!
//! A scenario is a fixture phase (direct API calls) followed by an ordered
//! list of UI steps. Scenarios own no shared state; each catalog build
//! generates fresh users.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::identity::{RegistrationRequest, TestUser, SHORT_PASSWORD, WRONG_PASSWORD};
use crate::page::{Page, WaitState};

/// DOM selectors the application's auth pages expose
pub mod selectors {
    pub const USERNAME: &str = "#username";
    pub const EMAIL: &str = "#email";
    pub const FIRST_NAME: &str = "#first_name";
    pub const LAST_NAME: &str = "#last_name";
    pub const PASSWORD: &str = "#password";
    pub const CONFIRM_PASSWORD: &str = "#confirm_password";
    pub const SUBMIT: &str = r#"button[type="submit"]"#;
    pub const SUCCESS_ALERT: &str = "#successAlert";
    pub const ERROR_ALERT: &str = "#errorAlert";
}

pub mod routes {
    pub const REGISTER: &str = "/register";
    pub const LOGIN: &str = "/login";
    pub const DASHBOARD: &str = "/dashboard";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Exercise,
}

/// Out-of-band fixture work done before any UI step
#[derive(Debug, Clone)]
pub enum SetupAction {
    RegisterViaApi(RegistrationRequest),
}

impl SetupAction {
    pub fn name(&self) -> String {
        match self {
            SetupAction::RegisterViaApi(req) => format!("register_via_api:{}", req.username),
        }
    }
}

/// A single UI step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a path relative to the base URL
    Navigate { path: String },

    Fill { selector: String, value: String },

    Click { selector: String },

    Wait {
        selector: String,
        #[serde(default)]
        state: WaitState,
    },

    /// Fixed delay (use sparingly)
    Sleep { ms: u64 },

    WaitForUrl { path: String },

    /// Element text must contain at least one of the substrings (case-sensitive)
    AssertTextContains { selector: String, any_of: Vec<String> },

    AssertUrl { path: String },
}

impl Step {
    pub fn navigate(path: &str) -> Self {
        Step::Navigate { path: path.to_string() }
    }

    pub fn fill(selector: &str, value: &str) -> Self {
        Step::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        }
    }

    pub fn click(selector: &str) -> Self {
        Step::Click { selector: selector.to_string() }
    }

    pub fn visible(selector: &str) -> Self {
        Step::Wait {
            selector: selector.to_string(),
            state: WaitState::Visible,
        }
    }

    pub fn wait_for_url(path: &str) -> Self {
        Step::WaitForUrl { path: path.to_string() }
    }

    pub fn text_contains(selector: &str, any_of: &[&str]) -> Self {
        Step::AssertTextContains {
            selector: selector.to_string(),
            any_of: any_of.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn assert_url(path: &str) -> Self {
        Step::AssertUrl { path: path.to_string() }
    }

    /// Short label for logs and results. Never includes filled values.
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { path } => format!("navigate:{}", path),
            Step::Fill { selector, .. } => format!("fill:{}", selector),
            Step::Click { selector } => format!("click:{}", selector),
            Step::Wait { selector, state } => format!("wait:{}:{}", selector, state.as_str()),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::WaitForUrl { path } => format!("wait_for_url:{}", path),
            Step::AssertTextContains { selector, .. } => format!("assert_text:{}", selector),
            Step::AssertUrl { path } => format!("assert_url:{}", path),
        }
    }

    /// Run this step against `page`
    pub async fn execute(&self, page: &mut dyn Page, base_url: &str) -> E2eResult<()> {
        debug!("Executing step: {}", self.name());

        match self {
            Step::Navigate { path } => page.navigate(&join_url(base_url, path)).await,
            Step::Fill { selector, value } => page.fill(selector, value).await,
            Step::Click { selector } => page.click(selector).await,
            Step::Wait { selector, state } => page.wait_for_selector(selector, *state).await,
            Step::Sleep { ms } => page.wait_for_timeout(*ms).await,
            Step::WaitForUrl { path } => page.wait_for_url(&join_url(base_url, path)).await,
            Step::AssertTextContains { selector, any_of } => {
                let text = page.inner_text(selector).await?;
                if any_of.iter().any(|needle| text.contains(needle.as_str())) {
                    return Ok(());
                }
                let expected = any_of
                    .iter()
                    .map(|s| format!("{:?}", s))
                    .collect::<Vec<_>>()
                    .join(" or ");
                Err(E2eError::AssertionFailed {
                    selector: selector.clone(),
                    expected: format!("text containing {}", expected),
                    actual: text,
                })
            }
            Step::AssertUrl { path } => {
                let expected = join_url(base_url, path);
                let actual = page.url().await?;
                if without_query_or_fragment(&actual) == expected {
                    return Ok(());
                }
                Err(E2eError::AssertionFailed {
                    selector: "page url".to_string(),
                    expected,
                    actual,
                })
            }
        }
    }
}

/// Strip any `?query` or `#fragment` from a URL
fn without_query_or_fragment(url: &str) -> &str {
    match url.find(|c: char| c == '?' || c == '#') {
        Some(end) => &url[..end],
        None => url,
    }
}

/// Join a relative path onto a base URL, tolerating a trailing slash
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub setup: Vec<SetupAction>,
    pub steps: Vec<Step>,
}

impl Scenario {
    fn new(name: &str, description: &str, tags: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            setup: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    /// Fixed delay after registration succeeds, before waiting for the
    /// redirect. Zero skips the delay entirely.
    pub settle_ms: u64,
}

/// Every scenario, with freshly generated users
pub fn catalog(options: &ScenarioOptions) -> Vec<Scenario> {
    vec![
        register_then_login(TestUser::generate(), options),
        register_short_password(TestUser::generate().with_password(SHORT_PASSWORD)),
        login_wrong_password(TestUser::generate()),
    ]
}

fn fill_registration_form(user: &TestUser) -> Vec<Step> {
    vec![
        Step::fill(selectors::USERNAME, &user.username),
        Step::fill(selectors::EMAIL, &user.email),
        Step::fill(selectors::FIRST_NAME, &user.first_name),
        Step::fill(selectors::LAST_NAME, &user.last_name),
        Step::fill(selectors::PASSWORD, &user.password),
        Step::fill(selectors::CONFIRM_PASSWORD, &user.password),
    ]
}

fn fill_login_form(username: &str, password: &str) -> Vec<Step> {
    vec![
        Step::fill(selectors::USERNAME, username),
        Step::fill(selectors::PASSWORD, password),
    ]
}

/// Register through the UI, then log in with the same credentials
pub fn register_then_login(user: TestUser, options: &ScenarioOptions) -> Scenario {
    let mut scenario = Scenario::new(
        "register_then_login",
        "Register a new user through the UI and then log in",
        &["auth", "registration", "login", "smoke"],
    );

    let steps = &mut scenario.steps;
    steps.push(Step::navigate(routes::REGISTER));
    steps.extend(fill_registration_form(&user));
    steps.push(Step::click(selectors::SUBMIT));
    steps.push(Step::visible(selectors::SUCCESS_ALERT));
    if options.settle_ms > 0 {
        steps.push(Step::Sleep { ms: options.settle_ms });
    }
    steps.push(Step::wait_for_url(routes::LOGIN));

    steps.extend(fill_login_form(&user.username, &user.password));
    steps.push(Step::click(selectors::SUBMIT));
    steps.push(Step::visible(selectors::SUCCESS_ALERT));
    steps.push(Step::wait_for_url(routes::DASHBOARD));

    scenario
}

/// Registration with a password below the minimum length must be rejected
/// without leaving the register page
pub fn register_short_password(user: TestUser) -> Scenario {
    let mut scenario = Scenario::new(
        "register_short_password",
        "Registration fails with a password that is too short",
        &["auth", "registration", "validation"],
    );

    let steps = &mut scenario.steps;
    steps.push(Step::navigate(routes::REGISTER));
    steps.extend(fill_registration_form(&user));
    steps.push(Step::click(selectors::SUBMIT));
    steps.push(Step::visible(selectors::ERROR_ALERT));
    steps.push(Step::text_contains(selectors::ERROR_ALERT, &["Password"]));
    steps.push(Step::assert_url(routes::REGISTER));

    scenario
}

/// Login with a wrong password for a user registered through the API
pub fn login_wrong_password(user: TestUser) -> Scenario {
    let mut scenario = Scenario::new(
        "login_wrong_password",
        "Attempting login with a wrong password shows an error",
        &["auth", "login", "negative"],
    );

    scenario.setup.push(SetupAction::RegisterViaApi(user.registration()));

    let steps = &mut scenario.steps;
    steps.push(Step::navigate(routes::LOGIN));
    steps.extend(fill_login_form(&user.username, WRONG_PASSWORD));
    steps.push(Step::click(selectors::SUBMIT));
    steps.push(Step::visible(selectors::ERROR_ALERT));
    steps.push(Step::text_contains(selectors::ERROR_ALERT, &["Invalid", "failed"]));

    scenario
}

/// Log the plan of a scenario at info level
pub fn describe(scenario: &Scenario) {
    info!(
        "{}: {} ({} setup action(s), {} step(s))",
        scenario.name,
        scenario.description,
        scenario.setup.len(),
        scenario.steps.len()
    );
}
