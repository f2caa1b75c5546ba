//! Generation client wrapping the external LLM port.
//!
//! The client owns prompt construction, the per-attempt timeout, and retry
//! policy (jittered exponential backoff on retryable provider errors).
//! Fatal errors, including prompts that fail validation, surface without
//! retry. A persistently retryable failure costs exactly `max_retries + 1`
//! provider calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::Error;
use crate::domain::RecipeMeta;
use crate::domain::ports::{GenerationFailureKind, TextGenerator, TextGeneratorError};

mod prompt;
mod runtime;

pub use prompt::{PromptError, StoryPrompt};
pub use runtime::{AttemptJitter, GenerationRuntime, TokioSleeper};

/// Client configuration controlling timeouts, retries and prompt size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationClientConfig {
    /// Ceiling on a single provider call.
    pub attempt_timeout: Duration,
    /// Retries after the first call for retryable failures.
    pub max_retries: u32,
    /// Initial retry backoff.
    pub initial_backoff: Duration,
    /// Maximum retry backoff cap.
    pub max_backoff: Duration,
    /// Characters of prior narrative quoted in continuation prompts.
    pub max_context_chars: usize,
}

impl Default for GenerationClientConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(20),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            max_context_chars: 2_000,
        }
    }
}

/// Retryability class of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorClass {
    /// Transient provider or network fault; retry budget was spent.
    Retryable,
    /// Malformed input or a refusal; retrying cannot help.
    Fatal,
}

/// Failure returned by [`GenerationClient::generate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The prompt could not be built; the provider was never called.
    #[error("story prompt invalid: {0}")]
    InvalidPrompt(#[from] PromptError),
    /// The provider returned a non-retryable error.
    #[error("generation rejected after {attempts} attempt(s): {source}")]
    Rejected {
        /// Provider calls made.
        attempts: u32,
        /// Last provider error.
        source: TextGeneratorError,
    },
    /// Every attempt failed with a retryable error.
    #[error("generation failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Provider calls made.
        attempts: u32,
        /// Last provider error.
        source: TextGeneratorError,
    },
}

impl GenerationError {
    /// Retryability class in the pipeline's error taxonomy.
    pub fn class(&self) -> GenerationErrorClass {
        match self {
            Self::RetriesExhausted { .. } => GenerationErrorClass::Retryable,
            Self::InvalidPrompt(_) | Self::Rejected { .. } => GenerationErrorClass::Fatal,
        }
    }

    /// Provider calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidPrompt(_) => 0,
            Self::Rejected { attempts, .. } | Self::RetriesExhausted { attempts, .. } => *attempts,
        }
    }

    /// Whether the final attempt timed out.
    pub fn timed_out(&self) -> bool {
        match self {
            Self::RetriesExhausted { source, .. } => source.is_timeout(),
            Self::InvalidPrompt(_) | Self::Rejected { .. } => false,
        }
    }

    /// Metrics label for this failure.
    pub fn failure_kind(&self) -> GenerationFailureKind {
        if self.timed_out() {
            return GenerationFailureKind::TimedOut;
        }
        match self.class() {
            GenerationErrorClass::Retryable => GenerationFailureKind::RetryExhausted,
            GenerationErrorClass::Fatal => GenerationFailureKind::Rejected,
        }
    }
}

impl From<GenerationError> for Error {
    fn from(error: GenerationError) -> Self {
        let details = json!({ "attempts": error.attempts() });
        let mapped = if error.timed_out() {
            Error::generation_timeout(error.to_string())
        } else {
            Error::generation_failed(error.to_string())
        };
        mapped.with_details(details)
    }
}

/// Async clock-independent sleeping abstraction for retries.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use backend::domain::story_generation::BackoffJitter;
    /// use chrono::{TimeZone, Utc};
    /// use std::time::Duration;
    /// struct DeterministicJitter;
    /// impl BackoffJitter for DeterministicJitter {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32, _now: chrono::DateTime<chrono::Utc>) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt) * 5)
    ///     }
    /// }
    /// let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).single().expect("valid time");
    /// let delay = DeterministicJitter.jittered_delay(Duration::from_millis(100), 2, now);
    /// assert_eq!(delay, Duration::from_millis(110));
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Generation client: prompt, timeout, retry.
pub struct GenerationClient {
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: GenerationClientConfig,
}

impl GenerationClient {
    /// Build a client using default runtime dependencies.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        config: GenerationClientConfig,
    ) -> Self {
        Self::with_runtime(generator, clock, GenerationRuntime::default(), config)
    }

    /// Build a client with injected runtime abstractions.
    pub fn with_runtime(
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        runtime: GenerationRuntime,
        config: GenerationClientConfig,
    ) -> Self {
        Self {
            generator,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &GenerationClientConfig {
        &self.config
    }

    /// Generate the text of segment `index` of `recipe`.
    ///
    /// `prior_context` is the text of segment `index - 1` when known.
    /// ```rust,ignore
    /// let text = client.generate(&recipe, 1, Some(previous.text())).await?;
    /// # Ok::<(), backend::domain::story_generation::GenerationError>(())
    /// ```
    pub async fn generate(
        &self,
        recipe: &RecipeMeta,
        index: u32,
        prior_context: Option<&str>,
    ) -> Result<String, GenerationError> {
        let prompt = StoryPrompt::build(recipe, index, prior_context, self.config.max_context_chars)?;
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.run_single_attempt(&prompt).await {
                Ok(text) => {
                    debug!(
                        recipe_id = %recipe.id,
                        index,
                        attempt,
                        bytes = text.len(),
                        "segment text generated"
                    );
                    return Ok(text);
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    warn!(
                        recipe_id = %recipe.id,
                        index,
                        attempt,
                        error = %error,
                        "retryable generation failure"
                    );
                    let base_delay = self.retry_base_delay(attempt);
                    let jittered = self
                        .jitter
                        .jittered_delay(base_delay, attempt, self.clock.utc());
                    self.sleeper.sleep(jittered).await;
                    attempt += 1;
                }
                Err(error) if error.is_retryable() => {
                    return Err(GenerationError::RetriesExhausted {
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    return Err(GenerationError::Rejected {
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    async fn run_single_attempt(&self, prompt: &StoryPrompt) -> Result<String, TextGeneratorError> {
        let timeout = self.config.attempt_timeout;
        let text = match tokio::time::timeout(timeout, self.generator.generate(prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TextGeneratorError::timeout(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                )));
            }
        };
        if text.trim().is_empty() {
            return Err(TextGeneratorError::decode("provider returned empty narrative"));
        }
        Ok(text)
    }

    fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

#[cfg(test)]
mod tests;
