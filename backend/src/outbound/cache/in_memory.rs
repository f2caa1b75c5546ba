//! Process-local segment cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use crate::domain::Segment;
use crate::domain::ports::{SegmentCache, SegmentCacheError, SegmentCacheKey};

#[derive(Debug, Clone)]
struct TimedSegment {
    segment: Segment,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct WriteTtl;

impl Expiry<String, TimedSegment> for WriteTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TimedSegment,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &TimedSegment,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded in-memory cache with per-entry expiry.
///
/// # Examples
/// ```
/// use std::time::Duration;
///
/// use backend::domain::ports::{SegmentCache, SegmentCacheKey};
/// use backend::domain::{RecipeId, Segment, SegmentKey};
/// use backend::outbound::cache::InMemorySegmentCache;
/// use chrono::Utc;
///
/// # tokio_test_block_on(async {
/// let cache = InMemorySegmentCache::new(1_000);
/// let key = SegmentCacheKey::for_segment(&SegmentKey::new(RecipeId::new("r1")?, 0));
/// cache.set(&key, &Segment::generated("Once...", Utc::now()), Duration::from_secs(60)).await?;
/// assert!(cache.get(&key).await?.is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime").block_on(fut)
/// # }
/// ```
#[derive(Clone)]
pub struct InMemorySegmentCache {
    inner: Cache<String, TimedSegment>,
}

impl InMemorySegmentCache {
    /// Create a cache holding at most `max_entries` segments.
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(WriteTtl)
                .build(),
        }
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[async_trait]
impl SegmentCache for InMemorySegmentCache {
    async fn get(&self, key: &SegmentCacheKey) -> Result<Option<Segment>, SegmentCacheError> {
        Ok(self
            .inner
            .get(key.as_str())
            .await
            .map(|entry| entry.segment))
    }

    async fn set(
        &self,
        key: &SegmentCacheKey,
        segment: &Segment,
        ttl: Duration,
    ) -> Result<(), SegmentCacheError> {
        self.inner
            .insert(
                key.as_str().to_owned(),
                TimedSegment {
                    segment: segment.clone(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &SegmentCacheKey) -> Result<(), SegmentCacheError> {
        self.inner.invalidate(key.as_str()).await;
        Ok(())
    }
}
