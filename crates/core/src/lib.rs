//! Shared building blocks for the DockerDeployer client.
//!
//! - [`error`]: error taxonomy and the [`ClassifiedError`] record.
//! - [`classify`]: the [`ErrorClassifier`] boundary.
//! - [`notify`]: notification sinks.
//! - [`session`]: the explicit [`SessionContext`].
//! - [`config`]: environment-driven [`DeployerConfig`].

pub mod classify;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;
pub mod types;

pub use classify::{ErrorClassifier, FixedClassifier};
pub use config::DeployerConfig;
pub use error::{ClassifiedError, ConfigError, ErrorKind};
pub use notify::{Notification, NotificationCenter, NotificationLevel, Notifier, TracingNotifier};
pub use session::SessionContext;
