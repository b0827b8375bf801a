//! REST client for the DockerDeployer backend.
//!
//! Wraps the container and template endpoints using [`reqwest`]. Every
//! request carries the bearer token currently held by the shared
//! [`SessionContext`].

use std::sync::Arc;
use std::time::Duration;

use deployer_core::SessionContext;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::{
    ActionResponse, Container, ContainerAction, DeployRequest, Deployment, LogsResponse, Template,
};

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {message}")]
    Status {
        status: u16,
        /// Message extracted from the error body, or the raw body.
        message: String,
        /// Machine code from the error body, when present.
        code: Option<String>,
    },
}

/// Error body shapes the backend is known to produce.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    detail: Option<String>,
    code: Option<String>,
}

/// HTTP client for one backend.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    session: Arc<SessionContext>,
}

impl ApiClient {
    /// Create a client with its own connection pool and a per-request
    /// timeout.
    pub fn new(session: Arc<SessionContext>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, session })
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, session: Arc<SessionContext>) -> Self {
        Self { client, session }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// `GET /api/containers`
    pub async fn list_containers(&self) -> Result<Vec<Container>, ApiError> {
        self.get("/api/containers").await
    }

    /// `GET /api/containers/{id}`
    pub async fn get_container(&self, id: &str) -> Result<Container, ApiError> {
        self.get(&format!("/api/containers/{id}")).await
    }

    /// `POST /api/containers/{id}/{action}`
    pub async fn container_action(
        &self,
        id: &str,
        action: ContainerAction,
    ) -> Result<ActionResponse, ApiError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/api/containers/{id}/{action}"))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/containers/{id}/logs?tail={tail}`
    pub async fn container_logs(&self, id: &str, tail: u32) -> Result<String, ApiError> {
        let logs: LogsResponse = self
            .get(&format!("/api/containers/{id}/logs?tail={tail}"))
            .await?;
        Ok(logs.logs)
    }

    /// `GET /api/templates`
    pub async fn list_templates(&self) -> Result<Vec<Template>, ApiError> {
        self.get("/api/templates").await
    }

    /// `POST /api/templates/deploy`
    pub async fn deploy_template(&self, request: &DeployRequest) -> Result<Deployment, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/api/templates/deploy")
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.session.api_url(path));
        match self.session.bearer() {
            Some(bearer) => builder.header(reqwest::header::AUTHORIZATION, bearer),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Self::parse_response(response).await
    }

    /// Ensure the response has a success status code, converting the body
    /// of a failed response into [`ApiError::Status`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(status_error(status.as_u16(), &body));
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Build an [`ApiError::Status`] from a status code and raw body.
///
/// JSON bodies shaped `{"error": .., "code": ..}` (or with `message` /
/// `detail` instead of `error`) contribute their message and code. Any
/// other body is used verbatim; an empty body leaves the message empty so
/// the classifier can substitute a default.
pub(crate) fn status_error(status: u16, body: &str) -> ApiError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .or(parsed.detail)
        .unwrap_or_else(|| body.trim().to_string());

    ApiError::Status {
        status,
        message,
        code: parsed.code,
    }
}
