//! Prometheus adapter for story pipeline counters.
//!
//! Three counter families back the `StoryMetrics` port:
//! `story_segments_total{origin}`, `story_generation_failures_total{kind}`
//! and `story_prefetch_total{outcome}`.

use async_trait::async_trait;
use prometheus::{IntCounterVec, Opts, Registry};

use crate::domain::SegmentOrigin;
use crate::domain::ports::{
    GenerationFailureKind, PrefetchOutcome, StoryMetrics, StoryMetricsError,
};

/// Prometheus-backed recorder for pipeline outcomes.
pub struct PrometheusStoryMetrics {
    segments_total: IntCounterVec,
    generation_failures_total: IntCounterVec,
    prefetch_total: IntCounterVec,
}

impl PrometheusStoryMetrics {
    /// Create and register counters with the provided registry.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let segments_total = IntCounterVec::new(
            Opts::new("story_segments_total", "Segments served by origin"),
            &["origin"],
        )?;
        let generation_failures_total = IntCounterVec::new(
            Opts::new(
                "story_generation_failures_total",
                "Failed segment generations by kind",
            ),
            &["kind"],
        )?;
        let prefetch_total = IntCounterVec::new(
            Opts::new("story_prefetch_total", "Prefetch attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(segments_total.clone()))?;
        registry.register(Box::new(generation_failures_total.clone()))?;
        registry.register(Box::new(prefetch_total.clone()))?;
        Ok(Self {
            segments_total,
            generation_failures_total,
            prefetch_total,
        })
    }
}

#[async_trait]
impl StoryMetrics for PrometheusStoryMetrics {
    async fn record_segment_served(&self, origin: SegmentOrigin) -> Result<(), StoryMetricsError> {
        self.segments_total
            .with_label_values(&[origin.as_str()])
            .inc();
        Ok(())
    }

    async fn record_generation_failure(
        &self,
        kind: GenerationFailureKind,
    ) -> Result<(), StoryMetricsError> {
        self.generation_failures_total
            .with_label_values(&[kind.as_str()])
            .inc();
        Ok(())
    }

    async fn record_prefetch(&self, outcome: PrefetchOutcome) -> Result<(), StoryMetricsError> {
        self.prefetch_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for story counters.

    use super::*;
    use rstest::rstest;

    fn make_metrics() -> (Registry, PrometheusStoryMetrics) {
        let registry = Registry::new();
        let metrics =
            PrometheusStoryMetrics::new(&registry).expect("metric registration should succeed");
        (registry, metrics)
    }

    #[tokio::test]
    async fn registers_all_families() {
        let (registry, metrics) = make_metrics();
        metrics
            .record_segment_served(SegmentOrigin::Cache)
            .await
            .expect("recording should not fail");
        metrics
            .record_generation_failure(GenerationFailureKind::TimedOut)
            .await
            .expect("recording should not fail");
        metrics
            .record_prefetch(PrefetchOutcome::Completed)
            .await
            .expect("recording should not fail");

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.name().to_owned())
            .collect();
        for expected in [
            "story_segments_total",
            "story_generation_failures_total",
            "story_prefetch_total",
        ] {
            assert!(names.iter().any(|name| name == expected), "{expected} missing");
        }
    }

    #[rstest]
    #[case(SegmentOrigin::Cache, "cache")]
    #[case(SegmentOrigin::Generated, "generated")]
    #[tokio::test]
    async fn segments_are_counted_by_origin(#[case] origin: SegmentOrigin, #[case] label: &str) {
        let (_registry, metrics) = make_metrics();

        metrics
            .record_segment_served(origin)
            .await
            .expect("recording should not fail");
        metrics
            .record_segment_served(origin)
            .await
            .expect("recording should not fail");

        assert_eq!(metrics.segments_total.with_label_values(&[label]).get(), 2);
    }

    #[rstest]
    #[case(PrefetchOutcome::Skipped, "skipped")]
    #[case(PrefetchOutcome::Abandoned, "abandoned")]
    #[tokio::test]
    async fn prefetches_are_counted_by_outcome(
        #[case] outcome: PrefetchOutcome,
        #[case] label: &str,
    ) {
        let (_registry, metrics) = make_metrics();

        metrics
            .record_prefetch(outcome)
            .await
            .expect("recording should not fail");

        assert_eq!(metrics.prefetch_total.with_label_values(&[label]).get(), 1);
    }
}
