//! Per-segment singleflight coordination.
//!
//! At most one generation job runs for a [`SegmentKey`] at any time. The
//! first caller to miss the cache starts a detached job; every other caller
//! for the same key joins it and receives the same outcome. Jobs run on their
//! own task, so a caller that stops waiting (a dropped HTTP request, an
//! abandoned prefetch) never cancels work other callers depend on.
//!
//! A successful job stores the segment in the cache before it leaves the
//! in-flight map, and only then publishes the result. A caller that misses
//! the map therefore finds the segment in the cache. Failures are published
//! to the joined callers and never cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use mockable::Clock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::ports::{SegmentCache, SegmentCacheKey};
use crate::domain::{Error, RecipeId, Segment, SegmentKey, TraceId};

/// Future producing the text of one segment.
pub type GenerationFuture = BoxFuture<'static, Result<String, Error>>;

type JobOutcome = Option<Result<Segment, Error>>;

/// Who started a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOrigin {
    /// A caller waiting on the response.
    Foreground,
    /// The prefetch scheduler.
    Prefetch,
}

impl JobOrigin {
    /// Stable label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Prefetch => "prefetch",
        }
    }
}

impl fmt::Display for JobOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct InFlightJob {
    origin: JobOrigin,
    outcome: watch::Receiver<JobOutcome>,
}

struct CoordinatorInner {
    cache: Arc<dyn SegmentCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    jobs: Mutex<HashMap<SegmentKey, InFlightJob>>,
}

impl CoordinatorInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<SegmentKey, InFlightJob>> {
        // The map holds no invariant a panicking holder could break halfway.
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn cached(&self, key: &SegmentKey) -> Option<Segment> {
        let cache_key = SegmentCacheKey::for_segment(key);
        match self.cache.get(&cache_key).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(segment = %key, error = %error, "segment cache read failed; treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &SegmentKey, segment: &Segment) {
        let cache_key = SegmentCacheKey::for_segment(key);
        if let Err(error) = self.cache.set(&cache_key, segment, self.ttl).await {
            warn!(segment = %key, error = %error, "segment cache write failed");
        }
    }
}

/// Removes the job's map entry when the job ends, including by panic.
struct JobSlot {
    inner: Arc<CoordinatorInner>,
    key: SegmentKey,
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.inner.lock_jobs().remove(&self.key);
    }
}

/// Singleflight coordinator over the segment cache.
#[derive(Clone)]
pub struct SegmentCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl SegmentCoordinator {
    /// Build a coordinator storing generated segments for `ttl`.
    pub fn new(cache: Arc<dyn SegmentCache>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                cache,
                clock,
                ttl,
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the segment for `key`, generating it at most once.
    ///
    /// `generate` runs only when this call starts a new job. It is dropped
    /// unused on a cache hit or when an in-flight job is joined.
    pub async fn resolve<F>(
        &self,
        key: &SegmentKey,
        origin: JobOrigin,
        generate: F,
    ) -> Result<Segment, Error>
    where
        F: FnOnce() -> GenerationFuture + Send + 'static,
    {
        if let Some(segment) = self.inner.cached(key).await {
            debug!(segment = %key, "segment cache hit");
            return Ok(segment.into_cached());
        }

        let mut outcome = self.join_or_start(key, origin, generate);
        match outcome.wait_for(Option::is_some).await {
            Ok(published) => match published.as_ref() {
                Some(result) => result.clone(),
                None => Err(Error::internal("generation job published no result")),
            },
            Err(_) => Err(Error::internal(format!(
                "generation job for {key} ended without a result"
            ))),
        }
    }

    fn join_or_start<F>(
        &self,
        key: &SegmentKey,
        origin: JobOrigin,
        generate: F,
    ) -> watch::Receiver<JobOutcome>
    where
        F: FnOnce() -> GenerationFuture + Send + 'static,
    {
        let mut jobs = self.inner.lock_jobs();
        if let Some(job) = jobs.get(key) {
            debug!(segment = %key, job_origin = %job.origin, caller = %origin, "joining in-flight job");
            return job.outcome.clone();
        }

        let (sender, receiver) = watch::channel(None);
        jobs.insert(
            key.clone(),
            InFlightJob {
                origin,
                outcome: receiver.clone(),
            },
        );
        drop(jobs);

        let slot = JobSlot {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
        };
        let trace_id = TraceId::current();
        tokio::spawn(TraceId::scope_optional(
            trace_id,
            run_job(slot, origin, sender, generate),
        ));
        receiver
    }

    /// Whether a job for `key` is running.
    pub fn is_in_flight(&self, key: &SegmentKey) -> bool {
        self.inner.lock_jobs().contains_key(key)
    }

    /// Whether any job for `recipe_id` is running.
    pub fn has_active_job_for(&self, recipe_id: &RecipeId) -> bool {
        self.inner
            .lock_jobs()
            .keys()
            .any(|key| key.recipe_id() == recipe_id)
    }

    /// Whether `key` is currently cached. Cache errors read as `false`.
    pub async fn is_cached(&self, key: &SegmentKey) -> bool {
        self.inner.cached(key).await.is_some()
    }

    /// Drop the cached segment for `key`.
    ///
    /// A running job for the key is unaffected and will store its result.
    pub async fn invalidate(&self, key: &SegmentKey) {
        let cache_key = SegmentCacheKey::for_segment(key);
        match self.inner.cache.delete(&cache_key).await {
            Ok(()) => info!(segment = %key, "segment invalidated"),
            Err(error) => warn!(segment = %key, error = %error, "segment cache delete failed"),
        }
    }
}

async fn run_job<F>(
    slot: JobSlot,
    origin: JobOrigin,
    sender: watch::Sender<JobOutcome>,
    generate: F,
) where
    F: FnOnce() -> GenerationFuture + Send + 'static,
{
    let inner = Arc::clone(&slot.inner);
    let key = slot.key.clone();
    let started = Instant::now();

    // A job that finished between the caller's cache check and map insert
    // has already stored its segment.
    let outcome = if let Some(segment) = inner.cached(&key).await {
        Ok(segment.into_cached())
    } else {
        info!(segment = %key, job_origin = %origin, "generation job started");
        match generate().await {
            Ok(text) => {
                let segment = Segment::generated(text, inner.clock.utc());
                inner.store(&key, &segment).await;
                info!(
                    segment = %key,
                    job_origin = %origin,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    bytes = segment.size_bytes(),
                    "generation job completed"
                );
                Ok(segment)
            }
            Err(error) => {
                warn!(
                    segment = %key,
                    job_origin = %origin,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "generation job failed"
                );
                Err(error)
            }
        }
    };

    drop(slot);
    if sender.send(Some(outcome)).is_err() {
        debug!(segment = %key, job_origin = %origin, "job finished with no waiters left");
    }
}

#[cfg(test)]
mod tests;
