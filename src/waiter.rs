//! State-change waiter.
//!
//! A [`StateWaiter`] polls the status of an asynchronous remote operation
//! until it reaches a target status, reaches a fatal status, or runs out of
//! time. Each status fetch goes through the [`RetryExecutor`], so a fetch that
//! fails transiently is retried within the time the waiter has left.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, RemoteError};
use crate::retry::{OperationKind, RetryExecutor};

/// Where a polled status places the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Still in progress, keep polling.
    Pending,
    /// Finished successfully.
    Target,
    /// Finished in a known bad state.
    Fatal,
}

/// The result of a successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitReport {
    /// The target status that ended the wait.
    pub status: String,
    /// How many statuses were fetched.
    pub polls: u32,
    /// How long the wait took, including the initial delay.
    pub elapsed: Duration,
}

/// Polls a status until it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct StateWaiter {
    action: String,
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
    fatal: BTreeSet<String>,
    timeout: Option<Duration>,
    interval: Option<Duration>,
    delay: Duration,
}

impl StateWaiter {
    /// Create a waiter for `action` that succeeds on any of `target`.
    pub fn new<S: Into<String>>(action: impl Into<String>, target: impl IntoIterator<Item = S>) -> Self {
        Self {
            action: action.into(),
            pending: BTreeSet::new(),
            target: target.into_iter().map(Into::into).collect(),
            fatal: BTreeSet::new(),
            timeout: None,
            interval: None,
            delay: Duration::ZERO,
        }
    }

    /// Statuses that mean the operation is still in progress.
    ///
    /// Unrecognised statuses are also treated as pending; the set only
    /// changes how they are logged.
    pub fn with_pending<S: Into<String>>(mut self, pending: impl IntoIterator<Item = S>) -> Self {
        self.pending = pending.into_iter().map(Into::into).collect();
        self
    }

    /// Statuses that mean the operation failed.
    pub fn with_fatal<S: Into<String>>(mut self, fatal: impl IntoIterator<Item = S>) -> Self {
        self.fatal = fatal.into_iter().map(Into::into).collect();
        self
    }

    /// Total time allowed for the wait. Defaults to the executor's
    /// `write_timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pause between polls. Defaults to the executor's `poll_interval`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Pause before the first poll.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The action name used for rate limiting and logs.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Total time allowed for the wait under `config`.
    pub fn timeout(&self, config: &EngineConfig) -> Duration {
        self.timeout.unwrap_or(config.write_timeout)
    }

    /// Pause between polls under `config`.
    pub fn interval(&self, config: &EngineConfig) -> Duration {
        self.interval.unwrap_or(config.poll_interval)
    }

    /// Place a status. A status in both the target and pending sets is a
    /// target.
    pub fn classify(&self, status: &str) -> PollState {
        if self.target.contains(status) {
            PollState::Target
        } else if self.fatal.contains(status) {
            PollState::Fatal
        } else {
            PollState::Pending
        }
    }

    /// Poll `fetch` until a terminal state.
    ///
    /// Returns [`EngineError::UnexpectedStatus`] on a fatal status and
    /// [`EngineError::DeadlineExceeded`], carrying the last status and last
    /// remote error seen, when the timeout elapses first.
    pub async fn wait<F, Fut>(&self, executor: &RetryExecutor, mut fetch: F) -> Result<WaitReport, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, RemoteError>>,
    {
        let timeout = self.timeout(executor.config());
        let interval = self.interval(executor.config());
        let start = Instant::now();
        let deadline = start + timeout;
        let mut polls: u32 = 0;
        let mut last_status: Option<String> = None;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay.min(timeout)).await;
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.deadline_exceeded(start, last_status, None));
            }

            polls += 1;
            let budget = executor.config().read_timeout.min(remaining);
            let status = match executor
                .invoke_within(OperationKind::Poll, &self.action, budget, &mut fetch)
                .await
            {
                Ok(status) => status,
                Err(EngineError::DeadlineExceeded { last_error, .. }) => {
                    return Err(self.deadline_exceeded(start, last_status, last_error));
                }
                Err(e) => return Err(e),
            };

            match self.classify(&status) {
                PollState::Target => {
                    debug!(action = %self.action, status = %status, polls, "reached target status");
                    return Ok(WaitReport {
                        status,
                        polls,
                        elapsed: start.elapsed(),
                    });
                }
                PollState::Fatal => {
                    warn!(action = %self.action, status = %status, polls, "reached fatal status");
                    return Err(EngineError::UnexpectedStatus {
                        action: self.action.clone(),
                        status,
                    });
                }
                PollState::Pending => {
                    if !self.pending.is_empty() && !self.pending.contains(&status) {
                        debug!(action = %self.action, status = %status, "unrecognised status, still waiting");
                    } else {
                        debug!(action = %self.action, status = %status, polls, "waiting");
                    }
                    last_status = Some(status);
                }
            }

            if start.elapsed() + interval > timeout {
                return Err(self.deadline_exceeded(start, last_status, None));
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn deadline_exceeded(
        &self,
        start: Instant,
        last_status: Option<String>,
        last_error: Option<RemoteError>,
    ) -> EngineError {
        EngineError::DeadlineExceeded {
            action: self.action.clone(),
            elapsed: start.elapsed(),
            last_status,
            last_error,
        }
    }
}
