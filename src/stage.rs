//! Generic structured-completion stage.
//!
//! A stage binds an instruction, a target schema, an input renderer and a
//! conformance check to a [`StructuredCompletion`] capability, and owns the
//! bounded retry loop around it. Extraction and scoring are two instances.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::completion::{CompletionRequest, StructuredCompletion};
use crate::config::CompletionConfig;
use crate::errors::AppError;

/// Renders a stage input into the text handed to the capability.
pub type RenderInput<I> = fn(&I) -> Result<String, AppError>;

/// Checks a raw completion value against the target shape, returning one
/// message per violating field.
pub type Conform<O> = fn(Value) -> Result<O, Vec<String>>;

/// Bounded retry discipline shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
    /// Upper bound for a single capability call.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Grace added on top of the HTTP client timeout so the client reports
    /// its own timeout first.
    const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
            attempt_timeout: Some(config.request_timeout + Self::TIMEOUT_GRACE),
        }
    }

    /// No delay and no timeout; for deterministic callers.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
            attempt_timeout: None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(250),
            attempt_timeout: None,
        }
    }
}

/// Static description of a stage.
pub struct StageDefinition<I: ?Sized, O> {
    /// Stage name used in logs and conformance errors.
    pub name: &'static str,
    pub schema_name: &'static str,
    pub instruction: String,
    pub schema: Value,
    pub render: RenderInput<I>,
    pub conform: Conform<O>,
}

/// A structured-completion call with validation and bounded retries.
///
/// Holds no mutable state; one instance may serve concurrent callers.
pub struct StructuredCompletionStage<I: ?Sized, O> {
    definition: StageDefinition<I, O>,
    capability: Arc<dyn StructuredCompletion>,
    retry: RetryPolicy,
}

impl<I: ?Sized, O> StructuredCompletionStage<I, O> {
    pub fn new(
        definition: StageDefinition<I, O>,
        capability: Arc<dyn StructuredCompletion>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            definition,
            capability,
            retry,
        }
    }

    /// Runs the stage, retrying retryable failures up to the policy bound.
    ///
    /// Returns the error of the last attempt once retries are exhausted, so
    /// a final timeout surfaces as `Timeout` and a final shape violation as
    /// `SchemaConformanceError`.
    pub async fn run(&self, input: &I) -> Result<O, AppError> {
        let rendered = (self.definition.render)(input)?;
        let attempts = self.retry.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 && !self.retry.backoff.is_zero() {
                tokio::time::sleep(self.retry.backoff * (attempt - 1)).await;
            }

            match self.attempt(&rendered).await {
                Ok(output) => {
                    tracing::info!(
                        "✓ {} stage succeeded on attempt {}/{}",
                        self.definition.name,
                        attempt,
                        attempts
                    );
                    return Ok(output);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        "{} stage attempt {}/{} failed ({}): {}",
                        self.definition.name,
                        attempt,
                        attempts,
                        e.kind(),
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let error = last_error.unwrap_or_else(|| {
            AppError::InternalError(format!("{} stage made no attempts", self.definition.name))
        });
        tracing::error!(
            "❌ {} stage gave up after {} attempts: {}",
            self.definition.name,
            attempts,
            error
        );
        Err(error)
    }

    async fn attempt(&self, input: &str) -> Result<O, AppError> {
        let request = CompletionRequest {
            schema_name: self.definition.schema_name,
            instruction: &self.definition.instruction,
            input,
            schema: &self.definition.schema,
        };

        let call = self.capability.complete(request);
        let raw = match self.retry.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                AppError::Timeout(format!(
                    "{} completion exceeded {:?}",
                    self.definition.name, limit
                ))
            })??,
            None => call.await?,
        };

        (self.definition.conform)(raw)
            .map_err(|violations| AppError::conformance(self.definition.name, violations))
    }
}
