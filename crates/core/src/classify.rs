//! Classifier boundary between raw failures and [`ClassifiedError`].
//!
//! Wrapped operations fail with whatever error type their transport
//! produces. An [`ErrorClassifier`] turns that into the tagged record the
//! rest of the client understands, and decides whether the failure is
//! worth retrying.

use std::fmt::Display;

use crate::error::{ClassifiedError, ErrorKind};

/// Normalizes raw errors of type `E` and judges their retryability.
pub trait ErrorClassifier<E>: Send + Sync {
    fn classify(&self, error: &E) -> ClassifiedError;

    fn is_retryable(&self, error: &E) -> bool;
}

/// Classifies every error as one fixed kind, using its `Display` text as
/// the message.
///
/// Useful for work that has no status codes to inspect (local tasks,
/// scripted calls).
#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier {
    kind: ErrorKind,
    retryable: bool,
}

impl FixedClassifier {
    pub fn new(kind: ErrorKind, retryable: bool) -> Self {
        Self { kind, retryable }
    }

    /// Retryability follows [`ErrorKind::is_transient`].
    pub fn of_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.is_transient())
    }
}

impl<E: Display> ErrorClassifier<E> for FixedClassifier {
    fn classify(&self, error: &E) -> ClassifiedError {
        let message = error.to_string();
        if message.is_empty() {
            ClassifiedError::from_kind(self.kind)
        } else {
            ClassifiedError::new(self.kind, message)
        }
    }

    fn is_retryable(&self, _error: &E) -> bool {
        self.retryable
    }
}
