//! Shared test doubles for the story pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use tokio::sync::Semaphore;

use crate::domain::SegmentOrigin;
use crate::domain::ports::{
    GenerationFailureKind, PrefetchOutcome, SegmentCache, SegmentCacheError, SegmentCacheKey,
    StoryMetrics, StoryMetricsError, TextGenerator, TextGeneratorError,
};
use crate::domain::story_generation::{BackoffJitter, RetrySleeper, StoryPrompt};
use crate::domain::Segment;

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("{name} mutex poisoned"),
    }
}

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}"),
        };
        *lock(&self.0, "clock") += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0, "clock")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RetrySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.0, "sleeper").clone()
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0, "sleeper").push(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32, _now: DateTime<Utc>) -> Duration {
        base
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptOffsetJitter;

impl BackoffJitter for AttemptOffsetJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, _now: DateTime<Utc>) -> Duration {
        base + Duration::from_millis(u64::from(attempt))
    }
}

/// Text generator with scripted results, optional latency, and an optional
/// gate that holds every call until permits are added.
///
/// Once the script runs out it answers `"Segment {n} of {title}."`, or the
/// configured persistent failure.
pub struct StubGenerator {
    scripted: Mutex<VecDeque<Result<String, TextGeneratorError>>>,
    persistent_failure: Option<TextGeneratorError>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    prompts: Mutex<Vec<StoryPrompt>>,
}

impl StubGenerator {
    pub fn succeeding() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(scripted: Vec<Result<String, TextGeneratorError>>) -> Self {
        Self {
            scripted: Mutex::new(scripted.into()),
            persistent_failure: None,
            delay: None,
            gate: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(error: TextGeneratorError) -> Self {
        Self {
            persistent_failure: Some(error),
            ..Self::succeeding()
        }
    }

    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    #[must_use]
    pub fn with_gate(self, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<StoryPrompt> {
        lock(&self.prompts, "prompts").clone()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.prompts().iter().map(StoryPrompt::index).collect()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, prompt: &StoryPrompt) -> Result<String, TextGeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts, "prompts").push(prompt.clone());
        let active_now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active_now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(next) = lock(&self.scripted, "script").pop_front() {
            return next;
        }
        match &self.persistent_failure {
            Some(error) => Err(error.clone()),
            None => Ok(format!(
                "Segment {} of {}.",
                prompt.index().saturating_add(1),
                prompt.title()
            )),
        }
    }
}

/// Hash-map segment cache that records writes and their TTLs.
#[derive(Default)]
pub struct MapSegmentCache {
    entries: Mutex<HashMap<String, (Segment, Duration)>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl MapSegmentCache {
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn ttl_for(&self, key: &SegmentCacheKey) -> Option<Duration> {
        lock(&self.entries, "cache")
            .get(key.as_str())
            .map(|(_, ttl)| *ttl)
    }

    pub fn contains(&self, key: &SegmentCacheKey) -> bool {
        lock(&self.entries, "cache").contains_key(key.as_str())
    }

    pub fn len(&self) -> usize {
        lock(&self.entries, "cache").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SegmentCache for MapSegmentCache {
    async fn get(&self, key: &SegmentCacheKey) -> Result<Option<Segment>, SegmentCacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.entries, "cache")
            .get(key.as_str())
            .map(|(segment, _)| segment.clone()))
    }

    async fn set(
        &self,
        key: &SegmentCacheKey,
        segment: &Segment,
        ttl: Duration,
    ) -> Result<(), SegmentCacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries, "cache").insert(key.as_str().to_owned(), (segment.clone(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &SegmentCacheKey) -> Result<(), SegmentCacheError> {
        lock(&self.entries, "cache").remove(key.as_str());
        Ok(())
    }
}

/// Cache whose backend is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSegmentCache;

#[async_trait]
impl SegmentCache for UnavailableSegmentCache {
    async fn get(&self, _key: &SegmentCacheKey) -> Result<Option<Segment>, SegmentCacheError> {
        Err(SegmentCacheError::backend("connection refused"))
    }

    async fn set(
        &self,
        _key: &SegmentCacheKey,
        _segment: &Segment,
        _ttl: Duration,
    ) -> Result<(), SegmentCacheError> {
        Err(SegmentCacheError::backend("connection refused"))
    }

    async fn delete(&self, _key: &SegmentCacheKey) -> Result<(), SegmentCacheError> {
        Err(SegmentCacheError::backend("connection refused"))
    }
}

/// Metrics sink that keeps every recorded event.
#[derive(Default)]
pub struct RecordingStoryMetrics {
    served: Mutex<Vec<SegmentOrigin>>,
    failures: Mutex<Vec<GenerationFailureKind>>,
    prefetches: Mutex<Vec<PrefetchOutcome>>,
}

impl RecordingStoryMetrics {
    pub fn served(&self) -> Vec<SegmentOrigin> {
        lock(&self.served, "served").clone()
    }

    pub fn failures(&self) -> Vec<GenerationFailureKind> {
        lock(&self.failures, "failures").clone()
    }

    pub fn prefetches(&self) -> Vec<PrefetchOutcome> {
        lock(&self.prefetches, "prefetches").clone()
    }
}

#[async_trait]
impl StoryMetrics for RecordingStoryMetrics {
    async fn record_segment_served(&self, origin: SegmentOrigin) -> Result<(), StoryMetricsError> {
        lock(&self.served, "served").push(origin);
        Ok(())
    }

    async fn record_generation_failure(
        &self,
        kind: GenerationFailureKind,
    ) -> Result<(), StoryMetricsError> {
        lock(&self.failures, "failures").push(kind);
        Ok(())
    }

    async fn record_prefetch(&self, outcome: PrefetchOutcome) -> Result<(), StoryMetricsError> {
        lock(&self.prefetches, "prefetches").push(outcome);
        Ok(())
    }
}
