//! In-process stand-in for the application under test
//!
//! `MockApp` serves the auth API with axum. `SimulatedPage` plays the part of
//! the browser running the app's front-end scripts: it validates the register
//! form client-side, calls the API on submit, shows the success/error alerts
//! and follows the post-success redirect.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use authflow_e2e::identity::RegistrationRequest;
use authflow_e2e::scenario::{join_url, routes, selectors};
use authflow_e2e::{E2eError, E2eResult, Launcher, Page, WaitState};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct MockOptions {
    /// Answer every API registration with 503
    pub reject_api_registration: bool,
    /// Answer every login with 401, even for correct credentials
    pub reject_logins: bool,
}

#[derive(Default)]
struct AppState {
    users: Mutex<HashMap<String, String>>,
    options: MockOptions,
}

pub struct MockApp {
    pub base_url: String,
    state: Arc<AppState>,
}

impl MockApp {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let state = Arc::new(AppState {
            users: Mutex::new(HashMap::new()),
            options,
        });

        let app = Router::new()
            .route("/auth/register", post(register))
            .route("/auth/login", post(login))
            .route("/register", get(page))
            .route("/login", get(page))
            .route("/dashboard", get(page))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn user_count(&self) -> usize {
        self.state.users.lock().unwrap().len()
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.state.users.lock().unwrap().contains_key(username)
    }

    pub fn launcher(&self) -> Box<dyn Launcher> {
        Box::new(SimulatedLauncher {
            base_url: self.base_url.clone(),
        })
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegistrationRequest>) -> Response {
    if state.options.reject_api_registration {
        return detail(StatusCode::SERVICE_UNAVAILABLE, "Registration temporarily disabled");
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Password must be at least 8 characters long",
        );
    }
    if req.password != req.confirm_password {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "Passwords do not match");
    }

    let mut users = state.users.lock().unwrap();
    if users.contains_key(&req.username) {
        return detail(StatusCode::BAD_REQUEST, "Username or email already exists");
    }
    users.insert(req.username.clone(), req.password);

    (StatusCode::CREATED, Json(json!({ "username": req.username }))).into_response()
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Response {
    let valid = state
        .users
        .lock()
        .unwrap()
        .get(&req.username)
        .map(|p| *p == req.password)
        .unwrap_or(false);

    if valid && !state.options.reject_logins {
        (StatusCode::OK, Json(json!({ "access_token": "token", "token_type": "bearer" }))).into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Invalid username or password")
    }
}

async fn page() -> Html<&'static str> {
    Html("<html><body><form></form></body></html>")
}

pub struct SimulatedLauncher {
    base_url: String,
}

#[async_trait]
impl Launcher for SimulatedLauncher {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        Ok(Box::new(SimulatedPage {
            base_url: self.base_url.clone(),
            client: reqwest::Client::new(),
            url: "about:blank".to_string(),
            fields: HashMap::new(),
            success: None,
            error: None,
            redirect: None,
        }))
    }
}

const REGISTER_FIELDS: &[&str] = &[
    selectors::USERNAME,
    selectors::EMAIL,
    selectors::FIRST_NAME,
    selectors::LAST_NAME,
    selectors::PASSWORD,
    selectors::CONFIRM_PASSWORD,
];

const LOGIN_FIELDS: &[&str] = &[selectors::USERNAME, selectors::PASSWORD];

pub struct SimulatedPage {
    base_url: String,
    client: reqwest::Client,
    url: String,
    fields: HashMap<String, String>,
    success: Option<String>,
    error: Option<String>,
    redirect: Option<String>,
}

impl SimulatedPage {
    fn route(&self) -> Option<&str> {
        self.url.strip_prefix(&self.base_url)
    }

    fn form_fields(&self) -> &'static [&'static str] {
        match self.route() {
            Some(routes::REGISTER) => REGISTER_FIELDS,
            Some(routes::LOGIN) => LOGIN_FIELDS,
            _ => &[],
        }
    }

    fn load(&mut self, url: String) {
        self.url = url;
        self.fields.clear();
        self.success = None;
        self.error = None;
        self.redirect = None;
    }

    fn field(&self, selector: &str) -> String {
        self.fields.get(selector).cloned().unwrap_or_default()
    }

    fn alert(&self, selector: &str) -> Option<&String> {
        match selector {
            selectors::SUCCESS_ALERT => self.success.as_ref(),
            selectors::ERROR_ALERT => self.error.as_ref(),
            _ => None,
        }
    }

    fn show_error(&mut self, message: String) {
        self.success = None;
        self.error = Some(message);
    }

    fn show_success(&mut self, message: &str, next: &str) {
        self.error = None;
        self.success = Some(message.to_string());
        self.redirect = Some(join_url(&self.base_url, next));
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> E2eResult<(u16, String)> {
        let resp = self
            .client
            .post(join_url(&self.base_url, path))
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let value: serde_json::Value = resp.json().await?;
        let detail = value["detail"].as_str().unwrap_or_default().to_string();
        Ok((status, detail))
    }

    async fn submit_register(&mut self) -> E2eResult<()> {
        let password = self.field(selectors::PASSWORD);
        if password.len() < MIN_PASSWORD_LEN {
            self.show_error("Password must be at least 8 characters long".to_string());
            return Ok(());
        }
        if password != self.field(selectors::CONFIRM_PASSWORD) {
            self.show_error("Passwords do not match".to_string());
            return Ok(());
        }

        let body = json!({
            "username": self.field(selectors::USERNAME),
            "email": self.field(selectors::EMAIL),
            "first_name": self.field(selectors::FIRST_NAME),
            "last_name": self.field(selectors::LAST_NAME),
            "password": password,
            "confirm_password": self.field(selectors::CONFIRM_PASSWORD),
        });
        match self.post("/auth/register", body).await? {
            (201, _) => {
                self.show_success("Registration successful! Redirecting to login...", routes::LOGIN)
            }
            (_, detail) => self.show_error(format!("Registration failed: {}", detail)),
        }
        Ok(())
    }

    async fn submit_login(&mut self) -> E2eResult<()> {
        let body = json!({
            "username": self.field(selectors::USERNAME),
            "password": self.field(selectors::PASSWORD),
        });
        match self.post("/auth/login", body).await? {
            (200, _) => self.show_success("Login successful! Redirecting...", routes::DASHBOARD),
            (_, detail) => self.show_error(format!("Login failed: {}", detail)),
        }
        Ok(())
    }
}

#[async_trait]
impl Page for SimulatedPage {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.load(url.to_string());
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        if !self.form_fields().contains(&selector) {
            return Err(E2eError::Timeout(format!("fill {}", selector)));
        }
        self.fields.insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        if selector != selectors::SUBMIT {
            return Err(E2eError::Timeout(format!("click {}", selector)));
        }
        let route = self.route().map(str::to_owned);
        match route.as_deref() {
            Some(routes::REGISTER) => self.submit_register().await,
            Some(routes::LOGIN) => self.submit_login().await,
            _ => Err(E2eError::Timeout(format!("click {}", selector))),
        }
    }

    async fn wait_for_selector(&mut self, selector: &str, state: WaitState) -> E2eResult<()> {
        let present = self.alert(selector).is_some() || self.form_fields().contains(&selector);
        let satisfied = match state {
            WaitState::Visible | WaitState::Attached => present,
            WaitState::Hidden | WaitState::Detached => !present,
        };
        if satisfied {
            Ok(())
        } else {
            Err(E2eError::Timeout(format!("{} to be {}", selector, state.as_str())))
        }
    }

    async fn wait_for_timeout(&mut self, _ms: u64) -> E2eResult<()> {
        Ok(())
    }

    async fn wait_for_url(&mut self, url: &str) -> E2eResult<()> {
        if self.url == url {
            return Ok(());
        }
        if self.redirect.as_deref() == Some(url) {
            self.load(url.to_string());
            return Ok(());
        }
        Err(E2eError::Timeout(format!("url {}", url)))
    }

    async fn inner_text(&mut self, selector: &str) -> E2eResult<String> {
        self.alert(selector)
            .cloned()
            .ok_or_else(|| E2eError::Timeout(format!("text of {}", selector)))
    }

    async fn url(&mut self) -> E2eResult<String> {
        Ok(self.url.clone())
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("simulated screenshot of {}", self.url))?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        Ok(())
    }
}
