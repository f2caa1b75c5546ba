//! Background prefetching of the segments a reader is about to reach.
//!
//! After segment *n* is served, [`PrefetchScheduler::touch`] schedules a
//! detached task that resolves *n+1* (up to the configured depth) so the next
//! request is a cache hit. Scheduling never blocks the caller and never
//! fails it. Background work is bounded three ways: one outstanding prefetch
//! per recipe by default, no prefetch while the recipe already has a
//! generation job running, and a global pool of background slots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::ports::{PrefetchOutcome, StoryMetrics};
use crate::domain::segment_coordinator::SegmentCoordinator;
use crate::domain::{Error, RecipeId, Segment, SegmentKey, TraceId};

/// Limits and reach of background prefetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Segments to resolve ahead of the one just served. Zero disables
    /// prefetching.
    pub depth: u32,
    /// How long a prefetch waits for one segment before giving up.
    pub timeout: Duration,
    /// Outstanding prefetch tasks allowed per recipe.
    pub max_per_recipe: usize,
    /// Outstanding prefetch tasks allowed overall.
    pub max_background: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            timeout: Duration::from_secs(15),
            max_per_recipe: 1,
            max_background: 32,
        }
    }
}

/// What the scheduler needs from the pipeline to warm a segment.
#[async_trait]
pub trait PrefetchTarget: Send + Sync {
    /// Number of segments in the recipe's story, `None` when unknown.
    async fn story_length(&self, recipe_id: &RecipeId) -> Result<Option<u32>, Error>;

    /// Resolve `key` as background work.
    async fn resolve_for_prefetch(&self, key: &SegmentKey) -> Result<Segment, Error>;
}

#[derive(Default)]
struct SchedulerState {
    outstanding: Mutex<HashMap<RecipeId, usize>>,
    active: AtomicUsize,
    idle: Notify,
}

impl SchedulerState {
    fn lock_outstanding(&self) -> MutexGuard<'_, HashMap<RecipeId, usize>> {
        self.outstanding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reservation held by one prefetch task; releases its slots on drop.
struct PrefetchTicket {
    state: Arc<SchedulerState>,
    recipe_id: RecipeId,
    _permit: OwnedSemaphorePermit,
}

impl Drop for PrefetchTicket {
    fn drop(&mut self) {
        {
            let mut outstanding = self.state.lock_outstanding();
            if let Some(count) = outstanding.get_mut(&self.recipe_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    outstanding.remove(&self.recipe_id);
                }
            }
        }
        if self.state.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

/// Schedules background resolution of upcoming segments.
#[derive(Clone)]
pub struct PrefetchScheduler {
    coordinator: SegmentCoordinator,
    target: Arc<dyn PrefetchTarget>,
    metrics: Arc<dyn StoryMetrics>,
    pool: Arc<Semaphore>,
    state: Arc<SchedulerState>,
    config: PrefetchConfig,
}

impl PrefetchScheduler {
    /// Build a scheduler that warms segments through `target`.
    pub fn new(
        coordinator: SegmentCoordinator,
        target: Arc<dyn PrefetchTarget>,
        metrics: Arc<dyn StoryMetrics>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            coordinator,
            target,
            metrics,
            pool: Arc::new(Semaphore::new(config.max_background)),
            state: Arc::new(SchedulerState::default()),
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Note that `served_index` of `recipe_id` was just served.
    ///
    /// Returns immediately. When limits allow, a detached task resolves the
    /// following segments in order, skipping cached ones and stopping at the
    /// first one already being generated.
    pub fn touch(&self, recipe_id: &RecipeId, served_index: u32) {
        if self.config.depth == 0 {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(recipe_id = %recipe_id, "prefetch skipped: no async runtime");
            return;
        };
        if self.coordinator.has_active_job_for(recipe_id) {
            debug!(recipe_id = %recipe_id, served_index, "prefetch skipped: recipe busy");
            return;
        }
        let Some(ticket) = self.reserve(recipe_id) else {
            return;
        };

        let task = PrefetchTask {
            coordinator: self.coordinator.clone(),
            target: Arc::clone(&self.target),
            metrics: Arc::clone(&self.metrics),
            depth: self.config.depth,
            timeout: self.config.timeout,
        };
        let recipe_id = recipe_id.clone();
        runtime.spawn(TraceId::scope_optional(TraceId::current(), async move {
            task.run(&recipe_id, served_index).await;
            drop(ticket);
        }));
    }

    fn reserve(&self, recipe_id: &RecipeId) -> Option<PrefetchTicket> {
        let mut outstanding = self.state.lock_outstanding();
        let current = outstanding.get(recipe_id).copied().unwrap_or(0);
        if current >= self.config.max_per_recipe {
            debug!(recipe_id = %recipe_id, current, "prefetch skipped: recipe limit reached");
            return None;
        }
        let Ok(permit) = Arc::clone(&self.pool).try_acquire_owned() else {
            debug!(recipe_id = %recipe_id, "prefetch skipped: background pool saturated");
            return None;
        };
        outstanding.insert(recipe_id.clone(), current + 1);
        self.state.active.fetch_add(1, Ordering::AcqRel);
        Some(PrefetchTicket {
            state: Arc::clone(&self.state),
            recipe_id: recipe_id.clone(),
            _permit: permit,
        })
    }

    /// Prefetch tasks currently scheduled or running.
    pub fn active_prefetches(&self) -> usize {
        self.state.active.load(Ordering::Acquire)
    }

    /// Wait until no prefetch task is outstanding.
    pub async fn drain(&self) {
        loop {
            let idle = self.state.idle.notified();
            if self.active_prefetches() == 0 {
                return;
            }
            idle.await;
        }
    }
}

struct PrefetchTask {
    coordinator: SegmentCoordinator,
    target: Arc<dyn PrefetchTarget>,
    metrics: Arc<dyn StoryMetrics>,
    depth: u32,
    timeout: Duration,
}

impl PrefetchTask {
    async fn run(&self, recipe_id: &RecipeId, served_index: u32) {
        // Let foreground work queued on this runtime go first.
        tokio::task::yield_now().await;

        let segment_count = match self.target.story_length(recipe_id).await {
            Ok(Some(count)) => count,
            Ok(None) => {
                debug!(recipe_id = %recipe_id, "prefetch stopped: unknown recipe");
                return;
            }
            Err(error) => {
                warn!(recipe_id = %recipe_id, error = %error, "prefetch stopped: metadata unavailable");
                return;
            }
        };
        let first = served_index.saturating_add(1);
        if first >= segment_count {
            return;
        }
        let last = served_index
            .saturating_add(self.depth)
            .min(segment_count.saturating_sub(1));

        for index in first..=last {
            let key = SegmentKey::new(recipe_id.clone(), index);
            if self.coordinator.is_in_flight(&key) {
                debug!(segment = %key, "prefetch stopped: segment already in flight");
                self.record(PrefetchOutcome::Skipped).await;
                return;
            }
            if self.coordinator.is_cached(&key).await {
                self.record(PrefetchOutcome::Skipped).await;
                continue;
            }
            match tokio::time::timeout(self.timeout, self.target.resolve_for_prefetch(&key)).await {
                Ok(Ok(segment)) => {
                    info!(segment = %key, bytes = segment.size_bytes(), "segment prefetched");
                    self.record(PrefetchOutcome::Completed).await;
                }
                Ok(Err(error)) => {
                    warn!(segment = %key, error = %error, "prefetch failed");
                    self.record(PrefetchOutcome::Failed).await;
                    return;
                }
                Err(_) => {
                    warn!(
                        segment = %key,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "prefetch abandoned; generation continues"
                    );
                    self.record(PrefetchOutcome::Abandoned).await;
                    return;
                }
            }
        }
    }

    async fn record(&self, outcome: PrefetchOutcome) {
        if let Err(error) = self.metrics.record_prefetch(outcome).await {
            warn!(error = %error, outcome = outcome.as_str(), "failed to record prefetch metric");
        }
    }
}
