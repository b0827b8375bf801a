//! Tracked, self-retrying wrapper around one asynchronous call.
//!
//! [`AsyncOperation`] runs a wrapped function (typically an [`ApiClient`]
//! call), publishes its lifecycle through a `tokio::sync::watch` channel,
//! retries transient failures with linear backoff, and reports the
//! terminal outcome to an optional [`Notifier`].
//!
//! Failures never escape: `execute` resolves to `None` and the classified
//! error is stored in the operation's state instead.
//!
//! [`ApiClient`]: crate::api::ApiClient

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deployer_core::{ClassifiedError, DeployerConfig, ErrorClassifier, Notifier};
use futures::future::{self, BoxFuture, Either, FutureExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Automatic retries performed when no policy is given.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Base delay of the linear backoff when no policy is given.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

/// Observable state of an [`AsyncOperation`].
///
/// `error` is `Some` exactly when `status` is [`OperationStatus::Failed`].
/// `data` only changes on success, so a failed call leaves the last good
/// result in place.
#[derive(Debug, Clone)]
pub struct OperationState<T> {
    pub data: Option<T>,
    pub status: OperationStatus,
    pub error: Option<ClassifiedError>,
    /// Automatic retries performed by the most recent invocation.
    pub retry_attempt_count: u32,
}

impl<T> Default for OperationState<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: OperationStatus::Idle,
            error: None,
            retry_attempt_count: 0,
        }
    }
}

impl<T> OperationState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == OperationStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Linear-backoff retry policy: the n-th retry waits `delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of automatic retries after the first call.
    pub attempts: u32,
    /// Base delay.
    pub delay: Duration,
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then perform retry number `attempt` (1-based).
    Retry { attempt: u32, delay: Duration },
    /// Finalize the invocation as failed.
    GiveUp,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }

    /// Decide what to do after a failure, given how many retries have
    /// already been performed and whether the failure is retryable.
    pub fn decide(&self, retries_done: u32, retryable: bool) -> RetryDecision {
        if retryable && retries_done < self.attempts {
            let attempt = retries_done + 1;
            RetryDecision::Retry {
                attempt,
                delay: self.delay_for(attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl From<&DeployerConfig> for RetryPolicy {
    fn from(config: &DeployerConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }
}

/// Suffix appended to error notifications when retries happened.
fn retry_suffix(retries: u32) -> String {
    match retries {
        0 => String::new(),
        1 => " (after 1 retry)".to_string(),
        n => format!(" (after {n} retries)"),
    }
}

// ---------------------------------------------------------------------------
// Options / builder
// ---------------------------------------------------------------------------

/// Notification and retry behavior of an operation.
#[derive(Debug, Clone)]
pub struct OperationOptions {
    pub retry: RetryPolicy,
    /// Message sent to the notifier on success. No success notification
    /// when `None`.
    pub success_message: Option<String>,
    /// Send terminal failures to the notifier.
    pub notify_errors: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            success_message: None,
            notify_errors: true,
        }
    }
}

type CallFn<A, T, E> = Box<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Builder returned by [`AsyncOperation::builder`].
pub struct OperationBuilder<A, T, E> {
    name: String,
    call: CallFn<A, T, E>,
    classifier: Arc<dyn ErrorClassifier<E>>,
    notifier: Option<Arc<dyn Notifier>>,
    options: OperationOptions,
}

impl<A, T, E> OperationBuilder<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.options.success_message = Some(message.into());
        self
    }

    pub fn notify_errors(mut self, enabled: bool) -> Self {
        self.options.notify_errors = enabled;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    pub fn options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> AsyncOperation<A, T, E> {
        let (state, _) = watch::channel(OperationState::default());
        AsyncOperation {
            inner: Arc::new(Inner {
                name: self.name,
                call: self.call,
                classifier: self.classifier,
                notifier: self.notifier,
                options: self.options,
                state,
                last_args: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Build the non-retrying variant. Any retry policy set on the builder
    /// is discarded.
    pub fn build_one_shot(mut self) -> OneShotOperation<A, T, E> {
        self.options.retry = RetryPolicy::none();
        OneShotOperation {
            inner: self.build(),
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncOperation
// ---------------------------------------------------------------------------

/// A retrying, observable wrapper around one asynchronous call.
///
/// Cheap to clone; clones share state. Each `execute` is an independent
/// invocation: concurrent invocations are neither queued nor cancelled,
/// and whichever resolves last writes the final state.
pub struct AsyncOperation<A, T, E> {
    inner: Arc<Inner<A, T, E>>,
}

impl<A, T, E> Clone for AsyncOperation<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A, T, E> {
    /// Used as the `operation` field in logs.
    name: String,
    call: CallFn<A, T, E>,
    classifier: Arc<dyn ErrorClassifier<E>>,
    notifier: Option<Arc<dyn Notifier>>,
    options: OperationOptions,
    state: watch::Sender<OperationState<T>>,
    last_args: Mutex<Option<A>>,
    /// Cancelled by [`AsyncOperation::shutdown`]; aborts backoff waits.
    cancel: CancellationToken,
}

impl<A, T, E> AsyncOperation<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    /// Start building an operation around `call`.
    ///
    /// `call` must be safe to invoke repeatedly with the same arguments
    /// when retries are enabled.
    pub fn builder<C, F, Fut>(
        name: impl Into<String>,
        classifier: C,
        call: F,
    ) -> OperationBuilder<A, T, E>
    where
        C: ErrorClassifier<E> + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        OperationBuilder {
            name: name.into(),
            call: Box::new(move |args| call(args).boxed()),
            classifier: Arc::new(classifier),
            notifier: None,
            options: OperationOptions::default(),
        }
    }

    /// Invoke the wrapped function with `args`.
    ///
    /// The state switches to `Pending` (clearing any previous error) before
    /// this method returns, so the loading state is visible even if the
    /// returned future is never polled. The future resolves to the result,
    /// or to `None` on failure.
    pub fn execute(&self, args: A) -> impl Future<Output = Option<T>> + Send + 'static {
        self.inner.begin(&args);
        Arc::clone(&self.inner).run(args)
    }

    /// Re-run the most recent invocation's arguments.
    ///
    /// Without a previous invocation nothing is called and the future
    /// resolves to `None`.
    pub fn retry(&self) -> impl Future<Output = Option<T>> + Send + 'static {
        let last = self
            .inner
            .last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match last {
            Some(args) => Either::Left(self.execute(args)),
            None => {
                tracing::warn!(operation = %self.inner.name, "No previous call to retry");
                Either::Right(future::ready(None))
            }
        }
    }

    /// Return to the idle state, forgetting data, error and arguments.
    pub fn reset(&self) {
        *self
            .inner
            .last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.inner.state.send_replace(OperationState::default());
    }

    /// Abandon pending backoff waits and disable retries for good.
    ///
    /// Invocations waiting to retry finish as `Failed` with the last error
    /// and resolve to `None` without calling the wrapped function again; a
    /// call already in flight still completes. Later invocations run once.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn snapshot(&self) -> OperationState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> OperationStatus {
        self.inner.state.borrow().status
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    pub fn error(&self) -> Option<ClassifiedError> {
        self.inner.state.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading()
    }

    pub fn retry_attempt_count(&self) -> u32 {
        self.inner.state.borrow().retry_attempt_count
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<OperationState<T>> {
        self.inner.state.subscribe()
    }
}

impl<A, T, E> Inner<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    fn begin(&self, args: &A) {
        *self.last_args.lock().unwrap_or_else(PoisonError::into_inner) = Some(args.clone());
        self.state.send_modify(|s| {
            s.status = OperationStatus::Pending;
            s.error = None;
            s.retry_attempt_count = 0;
        });
        tracing::debug!(operation = %self.name, "Operation started");
    }

    /// Call, classify, back off, repeat; until success or [`RetryDecision::GiveUp`].
    async fn run(self: Arc<Self>, args: A) -> Option<T> {
        let policy = self.options.retry;
        let mut retries = 0u32;

        loop {
            let err = match (self.call)(args.clone()).await {
                Ok(value) => {
                    self.succeed(value.clone());
                    return Some(value);
                }
                Err(err) => err,
            };

            match policy.decide(retries, self.classifier.is_retryable(&err)) {
                RetryDecision::Retry { .. } if self.cancel.is_cancelled() => {
                    tracing::debug!(operation = %self.name, "Retry skipped after shutdown");
                    self.fail(self.classifier.classify(&err), retries);
                    return None;
                }
                RetryDecision::Retry { attempt, delay } => {
                    self.state.send_modify(|s| s.retry_attempt_count = attempt);
                    tracing::warn!(
                        operation = %self.name,
                        attempt,
                        max_attempts = policy.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying",
                    );

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            tracing::debug!(operation = %self.name, "Retry abandoned on shutdown");
                            self.fail(self.classifier.classify(&err), retries);
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    retries = attempt;
                }
                RetryDecision::GiveUp => {
                    self.fail(self.classifier.classify(&err), retries);
                    return None;
                }
            }
        }
    }

    fn succeed(&self, value: T) {
        self.state.send_modify(|s| {
            s.data = Some(value);
            s.status = OperationStatus::Succeeded;
            s.error = None;
        });
        tracing::debug!(operation = %self.name, "Operation succeeded");

        if let (Some(notifier), Some(message)) = (&self.notifier, &self.options.success_message) {
            notifier.notify_success(message);
        }
    }

    fn fail(&self, error: ClassifiedError, retries: u32) {
        tracing::error!(
            operation = %self.name,
            kind = ?error.kind,
            retries,
            error = %error.message,
            "Operation failed",
        );

        let notification = format!("{}{}", error.message, retry_suffix(retries));
        self.state.send_modify(|s| {
            s.status = OperationStatus::Failed;
            s.error = Some(error);
            s.retry_attempt_count = retries;
        });

        if self.options.notify_errors {
            if let Some(notifier) = &self.notifier {
                notifier.notify_error(&notification);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OneShotOperation
// ---------------------------------------------------------------------------

/// Non-retrying variant for calls that must not be replayed (one-shot
/// submissions). Has no `retry()`.
pub struct OneShotOperation<A, T, E> {
    inner: AsyncOperation<A, T, E>,
}

impl<A, T, E> Clone for OneShotOperation<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, T, E> OneShotOperation<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    /// See [`AsyncOperation::execute`]. Failures are final on the first
    /// attempt.
    pub fn execute(&self, args: A) -> impl Future<Output = Option<T>> + Send + 'static {
        self.inner.execute(args)
    }

    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn snapshot(&self) -> OperationState<T> {
        self.inner.snapshot()
    }

    pub fn status(&self) -> OperationStatus {
        self.inner.status()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.data()
    }

    pub fn error(&self) -> Option<ClassifiedError> {
        self.inner.error()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.is_loading()
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationState<T>> {
        self.inner.subscribe()
    }
}
