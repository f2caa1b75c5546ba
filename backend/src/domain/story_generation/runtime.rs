//! Runtime helpers used by the generation retry policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{BackoffJitter, RetrySleeper};

/// Sleep and jitter strategies injected into the generation client.
pub struct GenerationRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn RetrySleeper>,
    /// Jitter strategy for retry delays.
    pub jitter: Arc<dyn BackoffJitter>,
}

impl Default for GenerationRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(AttemptJitter),
        }
    }
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Default jitter: adds up to a quarter of the base delay, seeded from the
/// clock's sub-second nanos and the attempt number.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptJitter;

impl BackoffJitter for AttemptJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = (base_ms / 4).max(1);
        let seed = u64::from(now.timestamp_subsec_nanos()) ^ u64::from(attempt);
        let extra = seed % (max_extra.saturating_add(1));
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_millis(100), 1)]
    #[case(Duration::from_millis(400), 3)]
    #[case(Duration::ZERO, 2)]
    fn attempt_jitter_stays_within_a_quarter(#[case] base: Duration, #[case] attempt: u32) {
        let now = Utc
            .with_ymd_and_hms(2026, 10, 19, 8, 30, 0)
            .single()
            .expect("valid time");
        let delay = AttemptJitter.jittered_delay(base, attempt, now);
        let ceiling = base + Duration::from_millis((base.as_millis() as u64 / 4).max(1));
        assert!(delay >= base, "delay never shrinks");
        assert!(delay <= ceiling, "delay {delay:?} above {ceiling:?}");
    }
}
