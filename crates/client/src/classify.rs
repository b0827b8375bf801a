use deployer_core::{ClassifiedError, ErrorClassifier, ErrorKind};

use crate::api::ApiError;

/// Classifies [`ApiError`]s by transport failure and HTTP status.
///
/// - connect, timeout and request-send failures are `Network` and retryable;
/// - status errors map through [`ErrorKind::from_status`] and are
///   retryable for 5xx, 408 and 429;
/// - everything else (decode, builder, redirect) is `Unknown` and final.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpErrorClassifier;

impl HttpErrorClassifier {
    fn request_kind(err: &reqwest::Error) -> ErrorKind {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ErrorKind::Network
        } else if let Some(status) = err.status() {
            ErrorKind::from_status(status.as_u16())
        } else {
            ErrorKind::Unknown
        }
    }
}

impl ErrorClassifier<ApiError> for HttpErrorClassifier {
    fn classify(&self, error: &ApiError) -> ClassifiedError {
        match error {
            ApiError::Request(err) => {
                let kind = Self::request_kind(err);
                match kind {
                    // reqwest's text for network failures is not fit for users.
                    ErrorKind::Network => ClassifiedError::from_kind(kind),
                    _ => ClassifiedError::new(kind, err.to_string()),
                }
            }
            ApiError::Status {
                status,
                message,
                code,
            } => {
                let kind = ErrorKind::from_status(*status);
                let mut classified = if message.is_empty() {
                    ClassifiedError::from_kind(kind)
                } else {
                    ClassifiedError::new(kind, message.clone())
                };
                classified.code = code.clone();
                classified
            }
        }
    }

    fn is_retryable(&self, error: &ApiError) -> bool {
        match error {
            ApiError::Request(err) => Self::request_kind(err).is_transient(),
            ApiError::Status { status, .. } => {
                matches!(*status, 408 | 429) || ErrorKind::from_status(*status).is_transient()
            }
        }
    }
}
