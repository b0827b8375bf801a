use serde::{Deserialize, Serialize};

/// Normalized category of a failed backend interaction.
///
/// Assigned at the classifier boundary so that call sites never inspect
/// raw error shapes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Server,
    Unknown,
}

impl ErrorKind {
    /// Map an HTTP status code onto an error kind.
    ///
    /// | Status       | Kind             |
    /// |--------------|------------------|
    /// | 400, 422     | `Validation`     |
    /// | 401          | `Authentication` |
    /// | 403          | `Authorization`  |
    /// | 404          | `NotFound`       |
    /// | 500..=599    | `Server`         |
    /// | anything else| `Unknown`        |
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether errors of this kind are likely to succeed when retried unchanged.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }

    /// Fallback user-facing message when the backend supplied none.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error. Please check your connection.",
            ErrorKind::Validation => "The request was invalid.",
            ErrorKind::Authentication => "Your session has expired. Please log in again.",
            ErrorKind::Authorization => "You do not have permission to perform this action.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::Server => "The server encountered an error. Please try again later.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }
}

/// Structured error record produced by an [`ErrorClassifier`](crate::classify::ErrorClassifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Human-readable message, suitable for a toast.
    pub message: String,
    /// Optional machine code supplied by the backend (e.g. `"VALIDATION_ERROR"`).
    pub code: Option<String>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Build a record carrying the kind's default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
