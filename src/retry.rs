//! Retry executor.
//!
//! Every remote call goes through a [`RetryExecutor`]. For each attempt it
//! takes a token from the shared [`RateLimiter`], runs the call, and sorts a
//! failure into an [`ErrorClass`] with the configured [`ErrorClassifier`].
//! Transient failures are retried at a fixed interval until the time budget
//! for the operation runs out; everything else is returned after one attempt.
//!
//! # Example
//!
//! ```ignore
//! let executor = RetryExecutor::new(EngineConfig::default());
//! let vpc = executor
//!     .invoke(OperationKind::Read, "DescribeVpcs", || client.describe_vpcs(&request))
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, RemoteError};
use crate::limiter::RateLimiter;

/// The outcome of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The attempt succeeded.
    Success(T),
    /// The attempt failed and may be retried.
    Retryable(RemoteError),
    /// The attempt failed and must not be retried.
    Fatal(RemoteError),
}

/// The kind of operation a remote call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Reading the resource.
    Read,
    /// Creating the resource.
    Create,
    /// Modifying the resource.
    Update,
    /// Deleting the resource.
    Delete,
    /// Fetching the status of an asynchronous operation.
    Poll,
}

impl OperationKind {
    /// Whether the operation uses the read budget.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::Poll)
    }

    /// Whether the operation changes the remote resource.
    pub fn is_mutation(self) -> bool {
        !self.is_read()
    }

    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a remote error should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry after the interval.
    Transient,
    /// Surface immediately.
    Fatal,
    /// The resource does not exist.
    NotFound,
    /// The resource is already in the requested state.
    AlreadyInDesiredState,
}

/// Decides how a remote error is handled.
///
/// Remote APIs disagree about which codes are transient, so the policy is
/// supplied by the provider. Closures with the same signature implement this
/// trait.
pub trait ErrorClassifier: Send + Sync {
    /// Classify `error` returned by an operation of kind `kind`.
    fn classify(&self, kind: OperationKind, error: &RemoteError) -> ErrorClass;
}

impl<F> ErrorClassifier for F
where
    F: Fn(OperationKind, &RemoteError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, kind: OperationKind, error: &RemoteError) -> ErrorClass {
        self(kind, error)
    }
}

const RETRYABLE_PREFIXES: &[&str] = &[
    "ClientError.NetworkError",
    "ClientError.HttpStatusCodeError",
    "RequestLimitExceeded",
    "InternalError",
    "ResourceInUse",
    "ResourceUnavailable",
];

const FATAL_PREFIXES: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "InvalidParameter",
    "MissingParameter",
];

/// Error classifier for APIs using dotted error codes
/// (`Category.Detail`, e.g. `ResourceNotFound.InstanceNotFound`).
///
/// - Authorization failures are fatal.
/// - Codes whose detail ends in `NotFound` (or `NotFoundError`) mean the
///   resource is gone, except while polling, where a new resource may not be
///   visible yet and the call is retried.
/// - Codes whose detail says the resource is already associated, bound or in
///   a state are treated as already done.
/// - Network errors, throttling, internal errors, busy or unavailable
///   resources are transient, as are any extra codes added with
///   [`DefaultClassifier::with_retryable_code`].
/// - Everything else is fatal.
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    extra_retryable: Vec<String>,
}

impl DefaultClassifier {
    /// Create a classifier with the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `code` (and any code it is a dotted prefix of) as transient.
    pub fn with_retryable_code(mut self, code: impl Into<String>) -> Self {
        self.extra_retryable.push(code.into());
        self
    }

    fn is_extra_retryable(&self, code: &str) -> bool {
        self.extra_retryable
            .iter()
            .any(|extra| code_has_prefix(code, extra))
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, kind: OperationKind, error: &RemoteError) -> ErrorClass {
        let code = error.code.as_str();

        if self.is_extra_retryable(code) {
            return ErrorClass::Transient;
        }
        if code_has_prefix(code, "AuthFailure") || code_has_prefix(code, "UnauthorizedOperation") {
            return ErrorClass::Fatal;
        }
        if is_not_found(code) {
            return if kind == OperationKind::Poll {
                ErrorClass::Transient
            } else {
                ErrorClass::NotFound
            };
        }
        if is_already_done(code) {
            return ErrorClass::AlreadyInDesiredState;
        }
        if FATAL_PREFIXES.iter().any(|p| code_has_prefix(code, p)) {
            return ErrorClass::Fatal;
        }
        if RETRYABLE_PREFIXES.iter().any(|p| code_has_prefix(code, p)) || is_busy(code) {
            return ErrorClass::Transient;
        }
        ErrorClass::Fatal
    }
}

/// Whether `code` equals `prefix` or starts with `prefix` followed by a dot.
fn code_has_prefix(code: &str, prefix: &str) -> bool {
    match code.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

fn detail(code: &str) -> &str {
    code.rsplit('.').next().unwrap_or(code)
}

fn is_not_found(code: &str) -> bool {
    let detail = detail(code);
    code_has_prefix(code, "ResourceNotFound")
        || detail.ends_with("NotFound")
        || detail.ends_with("NotFoundError")
}

fn is_already_done(code: &str) -> bool {
    let detail = detail(code);
    ["AlreadyAssociated", "AlreadyBound", "AlreadyIn", "AlreadyDone"]
        .iter()
        .any(|marker| detail.contains(marker))
}

fn is_busy(code: &str) -> bool {
    code_has_prefix(code, "FailedOperation") && code.to_ascii_lowercase().contains("busy")
}

/// Runs remote calls with rate limiting, classification and bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    config: EngineConfig,
    limiter: Arc<RateLimiter>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Create an executor with its own limiter and the default classifier.
    pub fn new(config: EngineConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            limiter,
            classifier: Arc::new(DefaultClassifier::new()),
        }
    }

    /// Share an existing limiter with other executors.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replace the error classifier.
    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The time budget for an operation of kind `kind`.
    pub fn budget_for(&self, kind: OperationKind) -> Duration {
        if kind.is_read() {
            self.config.read_timeout
        } else {
            self.config.write_timeout
        }
    }

    /// Classify a remote error with the configured classifier.
    pub fn classify(&self, kind: OperationKind, error: &RemoteError) -> ErrorClass {
        self.classifier.classify(kind, error)
    }

    /// Retry an already-classified operation within `budget`.
    ///
    /// `Retryable` outcomes are retried every `retry_interval` as long as
    /// another attempt fits in the budget; when it does not, the last error
    /// is returned inside [`EngineError::DeadlineExceeded`]. A `Fatal` outcome
    /// is returned as [`EngineError::Remote`] after one attempt.
    pub async fn retry<T, F, Fut>(
        &self,
        action: &str,
        budget: Duration,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        self.run(action, budget, || {
            let attempt = op();
            async move {
                match attempt.await {
                    Outcome::Success(value) => Ok(value),
                    Outcome::Retryable(e) => Err(EngineError::Transient(e)),
                    Outcome::Fatal(e) => Err(EngineError::Remote(e)),
                }
            }
        })
        .await
    }

    /// Run a remote call, classifying its errors, within the budget for `kind`.
    pub async fn invoke<T, F, Fut>(
        &self,
        kind: OperationKind,
        action: &str,
        op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.invoke_within(kind, action, self.budget_for(kind), op)
            .await
    }

    /// Like [`RetryExecutor::invoke`] with an explicit budget.
    pub async fn invoke_within<T, F, Fut>(
        &self,
        kind: OperationKind,
        action: &str,
        budget: Duration,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.run(action, budget, || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| match self.classify(kind, &e) {
                    ErrorClass::Transient => EngineError::Transient(e),
                    ErrorClass::Fatal => EngineError::Remote(e),
                    ErrorClass::NotFound => EngineError::NotFound(e),
                    ErrorClass::AlreadyInDesiredState => EngineError::AlreadyInDesiredState(e),
                })
            }
        })
        .await
    }

    /// Run a remote call whose repetition is harmless.
    ///
    /// Returns `Ok(None)` when the remote API reports that there is nothing
    /// to do: the resource is already gone during a delete, or already in the
    /// requested state during any mutation.
    pub async fn invoke_idempotent<T, F, Fut>(
        &self,
        kind: OperationKind,
        action: &str,
        op: F,
    ) -> Result<Option<T>, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match self.invoke(kind, action, op).await {
            Ok(value) => Ok(Some(value)),
            Err(EngineError::NotFound(e)) if kind == OperationKind::Delete => {
                info!(action, code = %e.code, "resource already deleted");
                Ok(None)
            }
            Err(EngineError::AlreadyInDesiredState(e)) if kind.is_mutation() => {
                info!(action, code = %e.code, "resource already in desired state");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn run<T, F, Fut>(&self, action: &str, budget: Duration, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            self.limiter.acquire(action).await;
            attempts += 1;

            let err = match op().await {
                Ok(value) => {
                    debug!(action, attempts, "remote call succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            let remote = err.remote_error().cloned();
            warn!(
                action,
                attempts,
                code = remote.as_ref().map(|e| e.code.as_str()).unwrap_or_default(),
                message = remote.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
                retryable = err.is_retryable(),
                "remote call failed"
            );

            if !err.is_retryable() {
                return Err(err);
            }

            let elapsed = start.elapsed();
            if elapsed + self.config.retry_interval > budget {
                return Err(EngineError::DeadlineExceeded {
                    action: action.to_string(),
                    elapsed,
                    last_status: None,
                    last_error: remote,
                });
            }
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }
}
