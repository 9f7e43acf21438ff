//! # Retry / Backoff
//!
//! Explicit state machine around a single service call:
//!
//! ```text
//! Attempting(n) ──transient──▶ Backoff(n) ──sleep base*n──▶ Attempting(n+1)
//!       │                                        (n == max_attempts ⇒ Failed)
//!       ├──success──▶ Done
//!       └──terminal─▶ Failed
//! ```
//!
//! Backoff is linear in the 1-indexed attempt number. Only rate limiting is
//! transient; every other failure is propagated without consuming a retry.

use crate::llm::ServiceError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Tagged outcome of one attempt
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    TransientFailure(ServiceError),
    TerminalFailure(ServiceError),
}

impl<T> From<Result<T, ServiceError>> for AttemptOutcome<T> {
    fn from(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(err) if err.is_transient() => AttemptOutcome::TransientFailure(err),
            Err(err) => AttemptOutcome::TerminalFailure(err),
        }
    }
}

/// Where the retry loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Backoff(u32),
    Done,
    Failed,
}

/// Suspends the calling worker between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given (1-indexed) failed attempt, saturating at `Duration::MAX`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    /// State that follows a transient failure on `attempt`
    pub fn after_transient(&self, attempt: u32) -> RetryState {
        if attempt >= self.max_attempts {
            RetryState::Failed
        } else {
            RetryState::Backoff(attempt)
        }
    }

    /// Drive `op` through the state machine until it succeeds or fails for good.
    ///
    /// `op` receives the 1-indexed attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        sleeper: &dyn Sleeper,
        mut op: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let mut state = RetryState::Attempting(1);
        let mut value: Option<T> = None;
        let mut last_error: Option<ServiceError> = None;

        while !matches!(state, RetryState::Done | RetryState::Failed) {
            state = match state {
                RetryState::Attempting(n) => {
                    tracing::debug!("{}: API call attempt {}/{}", label, n, self.max_attempts);
                    match op(n).await {
                        AttemptOutcome::Success(v) => {
                            value = Some(v);
                            RetryState::Done
                        }
                        AttemptOutcome::TransientFailure(err) => {
                            last_error = Some(err);
                            let next = self.after_transient(n);
                            if next == RetryState::Failed {
                                tracing::error!("{}: Max retries exceeded", label);
                            }
                            next
                        }
                        AttemptOutcome::TerminalFailure(err) => {
                            tracing::error!("{}: API call failed: {}", label, err);
                            last_error = Some(err);
                            RetryState::Failed
                        }
                    }
                }
                RetryState::Backoff(n) => {
                    let wait = self.delay_for(n);
                    tracing::warn!(
                        "{}: Rate limited. Waiting {:?} before retry...",
                        label,
                        wait
                    );
                    sleeper.sleep(wait).await;
                    RetryState::Attempting(n + 1)
                }
                terminal => terminal,
            };
        }

        match value {
            Some(v) => Ok(v),
            None => Err(last_error.unwrap_or_else(|| {
                ServiceError::terminal(format!("{label}: failed to get API response"))
            })),
        }
    }
}
