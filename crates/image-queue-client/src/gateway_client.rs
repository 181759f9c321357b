use crate::{ClientError, Result};
use image_queue_core::{TaskId, TaskPayload, TaskStatus};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct TaskIdResponse {
    task_id: TaskId,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: TaskStatus,
}

#[derive(Deserialize)]
struct ResultResponse {
    result: String,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    status: TaskStatus,
    result: &'a str,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Async HTTP client for the gateway
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(GatewayClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Use an existing bearer token for authenticated calls
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&str> {
        self.token.as_deref().ok_or(ClientError::NotLoggedIn)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url("/register"))
            .json(&Credentials { username, password })
            .send()
            .await?;
        check(response).await?;
        debug!("Registered user {}", username);
        Ok(())
    }

    /// Log in and keep the returned token on this client
    pub async fn login(&mut self, username: &str, password: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("/login"))
            .json(&Credentials { username, password })
            .send()
            .await?;
        let body: TokenResponse = check(response).await?.json().await?;
        self.token = Some(body.token.clone());
        Ok(body.token)
    }

    pub async fn submit_task(&self, payload: &TaskPayload) -> Result<TaskId> {
        let response = self
            .http
            .post(self.url("/task"))
            .bearer_auth(self.bearer()?)
            .json(payload)
            .send()
            .await?;
        let body: TaskIdResponse = check(response).await?.json().await?;
        Ok(body.task_id)
    }

    pub async fn status(&self, task_id: TaskId) -> Result<TaskStatus> {
        let response = self
            .http
            .get(self.url(&format!("/status/{}", task_id)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        let body: StatusResponse = check(response).await?.json().await?;
        Ok(body.status)
    }

    pub async fn result(&self, task_id: TaskId) -> Result<String> {
        let response = self
            .http
            .get(self.url(&format!("/result/{}", task_id)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        let body: ResultResponse = check(response).await?.json().await?;
        Ok(body.result)
    }

    /// Report a task outcome (worker to gateway)
    pub async fn commit(&self, task_id: TaskId, status: TaskStatus, result: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/commit/{}", task_id)))
            .json(&CommitRequest { status, result })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<()> {
        let response = self.http.get(self.url("/health")).send().await?;
        check(response).await?;
        Ok(())
    }
}

/// Turn non-success responses into typed errors
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);

    Err(match status {
        StatusCode::BAD_REQUEST => ClientError::BadRequest(message),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        other => ClientError::ServerError {
            status: other.as_u16(),
            message,
        },
    })
}
