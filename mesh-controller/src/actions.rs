//! Retrying action execution.
//!
//! Actions run strictly in order. An action is attempted until it succeeds, fails with an error
//! which is not transient, or exhausts its attempt budget. The first action which fails stops the
//! run, and every action after it is reported as skipped.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};

const METRIC_ACTION_FAILURES: &str = "mesh_cleanup_action_failures";

/// The retry policy of an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The total number of attempts.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new instance.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// The cleanup retry policy of the given config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cleanup_max_attempts, config.cleanup_retry_delay())
    }

    /// A policy making exactly one attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

type ActionFn = Box<dyn Fn() -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

/// A named, idempotent operation along with its retry policy.
pub struct Action {
    name: String,
    policy: RetryPolicy,
    op: ActionFn,
}

impl Action {
    /// Create a new action which is attempted once.
    pub fn new<F, Fut>(name: impl Into<String>, op: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            policy: RetryPolicy::once(),
            op: Box::new(move || op().boxed()),
        }
    }

    /// Set the retry policy of this action.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The name of this action.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The retry policy of this action.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute this action, retrying transient failures.
    pub async fn execute(&self) -> AppResult<()> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match (self.op)().await {
                Ok(()) => {
                    tracing::debug!(action = %self.name, attempt, "action succeeded");
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    tracing::warn!(action = %self.name, attempt, max_attempts, error = %err, "action failed, will retry");
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(action = %self.name, attempt, error = %err, "action failed");
                    metrics::increment_counter!(METRIC_ACTION_FAILURES);
                    return Err(err);
                }
            }
        }
    }
}

/// The status of an action after a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed(String),
    Skipped(String),
}

/// The outcome of a single action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn succeeded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ActionStatus::Succeeded,
        }
    }

    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ActionStatus::Failed(reason.into()),
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ActionStatus::Skipped(reason.into()),
        }
    }

    /// Check if the action was executed, successfully or not.
    pub fn is_executed(&self) -> bool {
        !matches!(self.status, ActionStatus::Skipped(_))
    }

    /// Check if the action failed.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ActionStatus::Failed(_))
    }
}

/// The result of running a sequence of actions.
#[derive(Debug)]
pub struct RunReport {
    /// The outcome of every action, in order.
    pub outcomes: Vec<ActionOutcome>,
    /// The error of the action which stopped the run.
    pub error: Option<AppError>,
}

impl RunReport {
    /// Convert this report into the error of the action which stopped the run, if any.
    pub fn into_result(self) -> AppResult<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A fail-fast executor of ordered actions.
#[derive(Default)]
pub struct RetryExecutor {
    actions: Vec<Action>,
}

impl RetryExecutor {
    /// Create a new instance.
    pub fn new() -> Self {
        metrics::register_counter!(METRIC_ACTION_FAILURES, metrics::Unit::Count, "cleanup actions which failed after exhausting their retries");
        Self { actions: vec![] }
    }

    /// Add an action to the end of this sequence.
    pub fn add_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Run all actions in order, stopping at the first failure.
    pub async fn run(self) -> RunReport {
        let mut outcomes = Vec::with_capacity(self.actions.len());
        let mut error: Option<(String, AppError)> = None;
        for action in self.actions {
            if let Some((failed, _)) = &error {
                outcomes.push(ActionOutcome::skipped(action.name, format!("'{}' failed", failed)));
                continue;
            }
            match action.execute().await {
                Ok(()) => outcomes.push(ActionOutcome::succeeded(action.name)),
                Err(err) => {
                    outcomes.push(ActionOutcome::failed(action.name.clone(), err.to_string()));
                    error = Some((action.name, err));
                }
            }
        }
        RunReport {
            outcomes,
            error: error.map(|(_, err)| err),
        }
    }
}
