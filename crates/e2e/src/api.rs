//! Direct HTTP calls into the application, used to provision scenario fixtures

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::identity::RegistrationRequest;

pub const REGISTER_ENDPOINT: &str = "/auth/register";

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register a user, bypassing the UI. Anything but `201 Created` is a
    /// setup failure.
    pub async fn register(&self, request: &RegistrationRequest) -> E2eResult<()> {
        let url = format!("{}{}", self.base_url, REGISTER_ENDPOINT);
        debug!("POST {} (username: {})", url, request.username);

        let resp = self.client.post(&url).json(request).send().await?;
        let status = resp.status();
        if status == StatusCode::CREATED {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(E2eError::SetupFailed {
            status: status.as_u16(),
            body,
        })
    }
}
