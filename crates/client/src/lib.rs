//! HTTP side of the DockerDeployer client.
//!
//! Provides the typed REST client ([`ApiClient`]), the HTTP error
//! classifier, and [`AsyncOperation`], the retrying state tracker that
//! UI code wraps around API calls.

pub mod api;
pub mod classify;
pub mod models;
pub mod operation;

pub use api::{ApiClient, ApiError};
pub use classify::HttpErrorClassifier;
pub use operation::{
    AsyncOperation, OneShotOperation, OperationBuilder, OperationOptions, OperationState,
    OperationStatus, RetryDecision, RetryPolicy,
};
