//! Remediation actions against GitHub, with bounded linear-backoff retry.
//!
//! `ActionExecutor::apply_once` is the only place a `SuggestionKind` is
//! turned into a GitHub call; the webhook pipeline and the manual retry
//! path both go through it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::rule::SuggestionKind;
use crate::services::github_service::GithubClient;

/// Attempts made by `execute_with_retry` before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff unit: the wait after attempt `n` is `n * BACKOFF_STEP`.
pub const BACKOFF_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("repository is not resolved")]
    UnresolvedRepository,

    #[error("target number must be positive, got {0}")]
    InvalidTarget(i64),

    #[error("suggestion value is empty")]
    EmptyValue,

    #[error("GitHub token is not configured")]
    MissingToken,

    #[error("GitHub API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GitHub request failed: {0}")]
    Transport(String),
}

impl ActionError {
    /// Remote failures are retried; local precondition failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Status { .. } | ActionError::Transport(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_step: BACKOFF_STEP,
        }
    }
}

/// Run `attempt` until it succeeds, fails terminally, or the policy's
/// attempt budget is spent. Returns the final error (if any) and the number
/// of attempts made.
///
/// Once `cancel` fires no further attempt is started; an attempt already in
/// flight runs to completion.
pub async fn execute_with_retry<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> (Option<ActionError>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), ActionError>>,
{
    let mut last_err = None;
    let mut attempts = 0;

    for n in 1..=policy.max_attempts {
        if n > 1 {
            if cancel.is_cancelled() {
                tracing::info!(attempts, "Request cancelled, not starting another attempt");
                break;
            }
            tokio::time::sleep(policy.backoff_step * (n - 1)).await;
        }

        attempts = n;
        match attempt(n).await {
            Ok(()) => return (None, attempts),
            Err(e) if !e.is_retryable() => return (Some(e), attempts),
            Err(e) => {
                tracing::warn!(attempt = n, error = %e, "Action attempt failed");
                last_err = Some(e);
            }
        }
    }

    (last_err, attempts)
}

/// Where a suggestion is applied.
#[derive(Debug, Clone, Copy)]
pub struct ActionTarget<'a> {
    pub repository: &'a str,
    pub number: i64,
}

pub struct ActionExecutor {
    github: GithubClient,
    policy: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(github: GithubClient, policy: RetryPolicy) -> Self {
        Self { github, policy }
    }

    /// Remote actions are only attempted with a token configured.
    pub fn is_configured(&self) -> bool {
        self.github.has_token()
    }

    /// Apply one suggestion exactly once.
    pub async fn apply_once(
        &self,
        kind: SuggestionKind,
        target: ActionTarget<'_>,
        value: &str,
    ) -> Result<(), ActionError> {
        match kind {
            SuggestionKind::Label => {
                self.github
                    .add_label(target.repository, target.number, value)
                    .await
            }
            SuggestionKind::Comment => {
                self.github
                    .add_comment(target.repository, target.number, value)
                    .await
            }
        }
    }

    /// Apply one suggestion under the retry policy.
    pub async fn apply_with_retry(
        &self,
        kind: SuggestionKind,
        target: ActionTarget<'_>,
        value: &str,
        cancel: &CancellationToken,
    ) -> (Option<ActionError>, u32) {
        execute_with_retry(&self.policy, cancel, move |_| {
            self.apply_once(kind, target, value)
        })
        .await
    }
}
