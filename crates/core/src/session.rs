//! Explicit session context shared by API and socket consumers.
//!
//! Built once at startup and handed to constructors by `Arc`, so that
//! every consumer sees the same endpoints and the same credentials.

use std::sync::{PoisonError, RwLock};

use crate::config::DeployerConfig;

/// Endpoints and credentials for one logged-in session.
#[derive(Debug)]
pub struct SessionContext {
    api_base_url: String,
    ws_url: String,
    token: RwLock<Option<String>>,
}

impl SessionContext {
    /// * `api_base_url` - HTTP base URL, e.g. `http://host:8000`.
    /// * `ws_url`       - WebSocket URL, e.g. `ws://host:8000/ws/events`.
    ///   Empty means "no event channel".
    pub fn new(api_base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        let api_base_url: String = api_base_url.into();
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.into(),
            token: RwLock::new(None),
        }
    }

    pub fn from_config(config: &DeployerConfig) -> Self {
        let session = Self::new(config.api_base_url.clone(), config.ws_url.clone());
        if let Some(token) = &config.token {
            session.set_token(token.clone());
        }
        session
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Store the token issued at login.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Forget the token (logout).
    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Value for the `Authorization` header, when logged in.
    pub fn bearer(&self) -> Option<String> {
        self.token().map(|t| format!("Bearer {t}"))
    }

    /// Absolute URL for an API path such as `/api/containers`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    /// WebSocket URL with the session token appended as `token=`.
    ///
    /// Returns an empty string when no WebSocket URL is configured, which
    /// a socket treats as "do not connect". The token is form-encoded.
    pub fn ws_endpoint(&self) -> String {
        if self.ws_url.is_empty() {
            return String::new();
        }
        match self.token() {
            Some(token) => {
                let sep = if self.ws_url.contains('?') { '&' } else { '?' };
                let token: String =
                    url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
                format!("{}{sep}token={token}", self.ws_url)
            }
            None => self.ws_url.clone(),
        }
    }
}
