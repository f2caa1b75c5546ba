//! Singleflight behaviour of the segment coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::FutureExt;
use futures_util::future::join_all;
use rstest::{fixture, rstest};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::{GenerationFuture, JobOrigin, SegmentCoordinator};
use crate::domain::ports::{SegmentCache, SegmentCacheKey};
use crate::domain::{Error, ErrorCode, RecipeId, Segment, SegmentKey, SegmentOrigin};
use crate::test_support::story::{MapSegmentCache, MutableClock, UnavailableSegmentCache};

const TTL: Duration = Duration::from_secs(3_600);

#[fixture]
fn key() -> SegmentKey {
    SegmentKey::new(RecipeId::new("r1").expect("valid id"), 0)
}

fn clock() -> Arc<MutableClock> {
    Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0)
            .single()
            .expect("valid time"),
    ))
}

/// Generation closure that counts invocations and waits for `gate`.
fn gated(
    calls: &Arc<AtomicUsize>,
    gate: &Arc<Semaphore>,
    result: Result<&'static str, Error>,
) -> impl FnOnce() -> GenerationFuture + Send + 'static {
    let calls = Arc::clone(calls);
    let gate = Arc::clone(gate);
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| Error::internal("gate closed"))?;
            result.map(str::to_owned)
        }
        .boxed()
    }
}

fn immediate(text: &'static str) -> impl FnOnce() -> GenerationFuture + Send + 'static {
    move || async move { Ok(text.to_owned()) }.boxed()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[rstest]
#[tokio::test]
async fn concurrent_callers_share_one_generation(key: SegmentKey) {
    let cache = Arc::new(MapSegmentCache::default());
    let coordinator = SegmentCoordinator::new(cache.clone(), clock(), TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let callers = (0..10).map(|_| {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let generate = gated(&calls, &gate, Ok("The kettle whistled."));
        tokio::spawn(async move {
            coordinator
                .resolve(&key, JobOrigin::Foreground, generate)
                .await
        })
    });
    let handles: Vec<_> = callers.collect();

    // Ten caller lookups plus the job's own re-check.
    wait_until(|| calls.load(Ordering::SeqCst) == 1 && cache.get_calls() == 11).await;
    assert!(coordinator.is_in_flight(&key));
    gate.add_permits(1);

    let results = join_all(handles).await;
    let segments: Vec<Segment> = results
        .into_iter()
        .map(|joined| joined.expect("task joined").expect("segment"))
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = &segments[0];
    assert!(segments.iter().all(|segment| segment.text() == first.text()));
    assert!(segments.iter().all(|segment| segment.created_at() == first.created_at()));
    assert_eq!(cache.set_calls(), 1);
    assert!(!coordinator.is_in_flight(&key));
}

#[rstest]
#[tokio::test]
async fn generated_segment_is_cached_with_ttl(key: SegmentKey) {
    let cache = Arc::new(MapSegmentCache::default());
    let coordinator = SegmentCoordinator::new(cache.clone(), clock(), TTL);

    let generated = coordinator
        .resolve(&key, JobOrigin::Foreground, immediate("Steam rose."))
        .await
        .expect("generated");
    assert_eq!(generated.origin(), SegmentOrigin::Generated);
    assert_eq!(cache.ttl_for(&SegmentCacheKey::for_segment(&key)), Some(TTL));

    let cached = coordinator
        .resolve(&key, JobOrigin::Foreground, || {
            async { Err(Error::internal("must not generate")) }.boxed()
        })
        .await
        .expect("cache hit");
    assert_eq!(cached.origin(), SegmentOrigin::Cache);
    assert_eq!(cached.text(), generated.text());
    assert_eq!(cached.created_at(), generated.created_at());
}

#[rstest]
#[tokio::test]
async fn failures_are_shared_but_not_cached(key: SegmentKey) {
    let cache = Arc::new(MapSegmentCache::default());
    let coordinator = SegmentCoordinator::new(cache.clone(), clock(), TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let first = {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let generate = gated(&calls, &gate, Err(Error::generation_failed("provider down")));
        tokio::spawn(async move { coordinator.resolve(&key, JobOrigin::Foreground, generate).await })
    };
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
    let second = {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let generate = gated(&calls, &gate, Ok("unused"));
        tokio::spawn(async move { coordinator.resolve(&key, JobOrigin::Foreground, generate).await })
    };
    wait_until(|| cache.get_calls() == 3).await;
    gate.add_permits(1);

    for handle in [first, second] {
        let error = handle.await.expect("task joined").expect_err("shared failure");
        assert_eq!(error.code(), ErrorCode::GenerationFailed);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.set_calls(), 0);
    assert!(!coordinator.is_in_flight(&key));

    let retried = coordinator
        .resolve(&key, JobOrigin::Foreground, immediate("Second try."))
        .await
        .expect("fresh job after failure");
    assert_eq!(retried.text(), "Second try.");
}

#[rstest]
#[tokio::test]
async fn job_survives_a_dropped_caller(key: SegmentKey) {
    let cache = Arc::new(MapSegmentCache::default());
    let coordinator = SegmentCoordinator::new(cache.clone(), clock(), TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let caller = {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let generate = gated(&calls, &gate, Ok("Still simmering."));
        tokio::spawn(async move { coordinator.resolve(&key, JobOrigin::Foreground, generate).await })
    };
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
    caller.abort();
    gate.add_permits(1);

    wait_until(|| !coordinator.is_in_flight(&key)).await;
    let stored = cache
        .get(&SegmentCacheKey::for_segment(&key))
        .await
        .expect("cache read")
        .expect("segment stored");
    assert_eq!(stored.text(), "Still simmering.");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn failed_job_without_waiters_frees_its_key(key: SegmentKey) {
    let cache = Arc::new(MapSegmentCache::default());
    let coordinator = SegmentCoordinator::new(cache.clone(), clock(), TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let caller = {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let generate = gated(&calls, &gate, Err(Error::generation_failed("upstream 503")));
        tokio::spawn(async move { coordinator.resolve(&key, JobOrigin::Foreground, generate).await })
    };
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
    caller.abort();
    gate.add_permits(1);

    wait_until(|| !coordinator.is_in_flight(&key)).await;
    assert!(cache.is_empty());
    let fresh = coordinator
        .resolve(&key, JobOrigin::Foreground, immediate("Fresh batch."))
        .await
        .expect("new job after unobserved failure");
    assert_eq!(fresh.origin(), SegmentOrigin::Generated);
    assert_eq!(fresh.text(), "Fresh batch.");
}

#[rstest]
#[tokio::test]
async fn unavailable_cache_fails_open(key: SegmentKey) {
    let coordinator = SegmentCoordinator::new(Arc::new(UnavailableSegmentCache), clock(), TTL);

    let segment = coordinator
        .resolve(&key, JobOrigin::Foreground, immediate("Cache-less."))
        .await
        .expect("generation despite cache outage");

    assert_eq!(segment.text(), "Cache-less.");
    assert!(!coordinator.is_cached(&key).await);
    coordinator.invalidate(&key).await;
}

#[rstest]
#[tokio::test]
async fn tracks_active_jobs_per_recipe(key: SegmentKey) {
    let coordinator = SegmentCoordinator::new(Arc::new(MapSegmentCache::default()), clock(), TTL);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let other_recipe = RecipeId::new("r2").expect("valid id");

    let job = {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let generate = gated(&calls, &gate, Ok("Busy."));
        tokio::spawn(async move { coordinator.resolve(&key, JobOrigin::Prefetch, generate).await })
    };
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;

    assert!(coordinator.has_active_job_for(key.recipe_id()));
    assert!(!coordinator.has_active_job_for(&other_recipe));

    gate.add_permits(1);
    job.await.expect("task joined").expect("segment");
    assert!(!coordinator.has_active_job_for(key.recipe_id()));
}

#[rstest]
#[tokio::test]
async fn invalidate_forces_regeneration(key: SegmentKey) {
    let cache = Arc::new(MapSegmentCache::default());
    let coordinator = SegmentCoordinator::new(cache.clone(), clock(), TTL);

    coordinator
        .resolve(&key, JobOrigin::Foreground, immediate("Version one."))
        .await
        .expect("generated");
    assert!(coordinator.is_cached(&key).await);

    coordinator.invalidate(&key).await;
    assert!(!coordinator.is_cached(&key).await);

    let regenerated = coordinator
        .resolve(&key, JobOrigin::Foreground, immediate("Version two."))
        .await
        .expect("regenerated");
    assert_eq!(regenerated.text(), "Version two.");
}

#[rstest]
fn job_origin_labels_are_stable() {
    assert_eq!(JobOrigin::Foreground.to_string(), "foreground");
    assert_eq!(JobOrigin::Prefetch.as_str(), "prefetch");
}
