//! Driven port for the external LLM capability.
//!
//! The provider is a black box: it takes a prompt and returns narrative text
//! or an error. The domain owns the prompt shape and the retryability
//! classification so the generation client can stay adapter-agnostic.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::story_generation::StoryPrompt;

define_port_error! {
    /// Errors surfaced while calling the LLM provider.
    pub enum TextGeneratorError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "text generation transport failed: {message}",
        /// The provider did not answer in time.
        Timeout { message: String } =>
            "text generation timed out: {message}",
        /// The provider rate-limited the request.
        RateLimited { message: String } =>
            "text generation rate limited: {message}",
        /// The provider reported a transient server-side failure.
        Upstream { message: String } =>
            "text generation provider failed: {message}",
        /// The prompt was malformed or refused as invalid input.
        InvalidPrompt { message: String } =>
            "text generation prompt invalid: {message}",
        /// The provider refused the call (credentials, policy).
        Rejected { message: String } =>
            "text generation rejected: {message}",
        /// The provider's response could not be decoded.
        Decode { message: String } =>
            "text generation response decode failed: {message}",
    }
}

impl TextGeneratorError {
    /// Return whether retrying this error is expected to help.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::ports::TextGeneratorError;
    ///
    /// assert!(TextGeneratorError::timeout("slow").is_retryable());
    /// assert!(!TextGeneratorError::invalid_prompt("empty").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::Upstream { .. }
        )
    }

    /// Return whether the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Port for turning a story prompt into narrative text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate narrative text for one prompt.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use backend::domain::ports::{FixtureTextGenerator, TextGenerator};
    ///
    /// let generator = FixtureTextGenerator;
    /// let text = generator.generate(&prompt).await?;
    /// assert!(!text.is_empty());
    /// # Ok::<(), backend::domain::ports::TextGeneratorError>(())
    /// ```
    async fn generate(&self, prompt: &StoryPrompt) -> Result<String, TextGeneratorError>;
}

/// Fixture implementation producing deterministic placeholder narrative.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureTextGenerator;

#[async_trait]
impl TextGenerator for FixtureTextGenerator {
    async fn generate(&self, prompt: &StoryPrompt) -> Result<String, TextGeneratorError> {
        Ok(format!(
            "Chapter {} of the story of {}.",
            prompt.index().saturating_add(1),
            prompt.title()
        ))
    }
}
