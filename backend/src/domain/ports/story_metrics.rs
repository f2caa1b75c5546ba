//! Domain port surface for story pipeline counters.
//!
//! This keeps pipeline observability at the domain boundary so adapters can
//! emit Prometheus counters without leaking implementation details into the
//! coordinator or scheduler.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::SegmentOrigin;

define_port_error! {
    /// Errors exposed when recording pipeline metrics.
    pub enum StoryMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } =>
            "story metrics exporter failed: {message}",
    }
}

/// Failure reason labels for foreground generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GenerationFailureKind {
    /// Retry budget was exhausted on retryable provider errors.
    RetryExhausted,
    /// The last attempt timed out.
    TimedOut,
    /// The provider or prompt validation rejected the request.
    Rejected,
    /// Pipeline state was unavailable (for example a lost job result).
    InternalError,
}

impl GenerationFailureKind {
    /// Stable label for exporters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RetryExhausted => "retry_exhausted",
            Self::TimedOut => "timed_out",
            Self::Rejected => "rejected",
            Self::InternalError => "internal_error",
        }
    }
}

/// Outcome labels for one prefetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PrefetchOutcome {
    /// The prefetched segment is now cached.
    Completed,
    /// A segment was already cached or being generated.
    Skipped,
    /// Generation failed; the next foreground request regenerates.
    Failed,
    /// The scheduler stopped waiting past its timeout.
    Abandoned,
}

impl PrefetchOutcome {
    /// Stable label for exporters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Metrics recording port for the story pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryMetrics: Send + Sync {
    /// Record one segment returned to a foreground caller.
    async fn record_segment_served(&self, origin: SegmentOrigin) -> Result<(), StoryMetricsError>;

    /// Record one foreground generation failure.
    async fn record_generation_failure(
        &self,
        kind: GenerationFailureKind,
    ) -> Result<(), StoryMetricsError>;

    /// Record the outcome of one prefetch decision.
    async fn record_prefetch(&self, outcome: PrefetchOutcome) -> Result<(), StoryMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStoryMetrics;

#[async_trait]
impl StoryMetrics for NoOpStoryMetrics {
    async fn record_segment_served(&self, _origin: SegmentOrigin) -> Result<(), StoryMetricsError> {
        Ok(())
    }

    async fn record_generation_failure(
        &self,
        _kind: GenerationFailureKind,
    ) -> Result<(), StoryMetricsError> {
        Ok(())
    }

    async fn record_prefetch(&self, _outcome: PrefetchOutcome) -> Result<(), StoryMetricsError> {
        Ok(())
    }
}
