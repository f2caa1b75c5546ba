//! Redis-backed segment cache.
//!
//! Segments are stored as JSON under their namespaced key with `SET .. EX`.
//! The expiry is stretched by a random fraction so entries written together
//! do not all expire together.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection, RunError};
use bb8_redis::redis::{AsyncCommands, RedisError};
use rand::Rng;
use tracing::debug;

use crate::domain::Segment;
use crate::domain::ports::{SegmentCache, SegmentCacheError, SegmentCacheKey};

/// Pool and expiry settings for [`RedisSegmentCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct RedisCacheSettings {
    /// Connection URL, for example `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// How long a checkout may wait for a free connection.
    pub connection_timeout: Duration,
    /// Upper bound on the extra expiry, as a fraction of the TTL.
    pub ttl_jitter: f64,
}

impl RedisCacheSettings {
    /// Settings with default pool sizing for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(2),
            ttl_jitter: 0.1,
        }
    }
}

/// Segment cache shared through Redis.
#[derive(Clone)]
pub struct RedisSegmentCache {
    pool: Pool<RedisConnectionManager>,
    ttl_jitter: f64,
}

impl RedisSegmentCache {
    /// Connect a pool using `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the initial connections
    /// cannot be established.
    pub async fn connect(settings: &RedisCacheSettings) -> Result<Self, RedisError> {
        let manager = RedisConnectionManager::new(settings.url.as_str())?;
        let pool = Pool::builder()
            .max_size(settings.pool_size.max(1))
            .connection_timeout(settings.connection_timeout)
            .build(manager)
            .await?;
        Ok(Self::from_pool(pool, settings.ttl_jitter))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool<RedisConnectionManager>, ttl_jitter: f64) -> Self {
        Self {
            pool,
            ttl_jitter: clamp_jitter(ttl_jitter),
        }
    }

    async fn connection(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, SegmentCacheError> {
        self.pool.get().await.map_err(map_pool_error)
    }
}

#[async_trait]
impl SegmentCache for RedisSegmentCache {
    async fn get(&self, key: &SegmentCacheKey) -> Result<Option<Segment>, SegmentCacheError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(key.as_str()).await.map_err(map_redis_error)?;
        payload.as_deref().map(decode_segment).transpose()
    }

    async fn set(
        &self,
        key: &SegmentCacheKey,
        segment: &Segment,
        ttl: Duration,
    ) -> Result<(), SegmentCacheError> {
        let payload = encode_segment(segment)?;
        let seconds = jittered_ttl_seconds(ttl, self.ttl_jitter, &mut rand::thread_rng());
        let mut conn = self.connection().await?;
        let () = conn
            .set_ex(key.as_str(), payload, seconds)
            .await
            .map_err(map_redis_error)?;
        debug!(key = key.as_str(), ttl_seconds = seconds, "segment written to redis");
        Ok(())
    }

    async fn delete(&self, key: &SegmentCacheKey) -> Result<(), SegmentCacheError> {
        let mut conn = self.connection().await?;
        let _: u64 = conn.del(key.as_str()).await.map_err(map_redis_error)?;
        Ok(())
    }
}

fn clamp_jitter(fraction: f64) -> f64 {
    if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Whole seconds to expire after: `ttl` plus up to `jitter * ttl`, never
/// below one second.
fn jittered_ttl_seconds(ttl: Duration, jitter: f64, rng: &mut impl Rng) -> u64 {
    let base = ttl.as_secs().max(1);
    let max_extra = (base as f64 * clamp_jitter(jitter)).floor() as u64;
    if max_extra == 0 {
        return base;
    }
    base.saturating_add(rng.gen_range(0..=max_extra))
}

fn encode_segment(segment: &Segment) -> Result<String, SegmentCacheError> {
    serde_json::to_string(segment).map_err(|error| SegmentCacheError::serialization(error.to_string()))
}

fn decode_segment(payload: &str) -> Result<Segment, SegmentCacheError> {
    serde_json::from_str(payload).map_err(|error| SegmentCacheError::serialization(error.to_string()))
}

fn map_redis_error(error: RedisError) -> SegmentCacheError {
    SegmentCacheError::backend(error.to_string())
}

fn map_pool_error(error: RunError<RedisError>) -> SegmentCacheError {
    match error {
        RunError::User(error) => map_redis_error(error),
        RunError::TimedOut => SegmentCacheError::backend("timed out waiting for a redis connection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_secs(3_600), 0.1, 3_600, 3_960)]
    #[case(Duration::from_secs(100), 0.0, 100, 100)]
    #[case(Duration::from_millis(200), 0.5, 1, 1)]
    #[case(Duration::from_secs(10), 7.0, 10, 20)]
    fn ttl_jitter_stays_in_bounds(
        #[case] ttl: Duration,
        #[case] jitter: f64,
        #[case] low: u64,
        #[case] high: u64,
    ) {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..64 {
            let seconds = jittered_ttl_seconds(ttl, jitter, &mut rng);
            assert!((low..=high).contains(&seconds), "{seconds} outside {low}..={high}");
        }
    }

    #[rstest]
    fn segments_survive_json_storage() {
        let created_at = Utc
            .with_ymd_and_hms(2026, 10, 19, 7, 45, 0)
            .single()
            .expect("valid time");
        let segment = Segment::generated("Saffron bloomed in the rice.", created_at);

        let payload = encode_segment(&segment).expect("encodes");
        assert!(payload.contains("\"createdAt\""));
        assert_eq!(decode_segment(&payload).expect("decodes"), segment);
    }

    #[rstest]
    fn corrupt_payloads_are_serialization_errors() {
        assert!(matches!(
            decode_segment("{\"text\": 3}"),
            Err(SegmentCacheError::Serialization { .. })
        ));
    }

    #[rstest]
    fn non_finite_jitter_is_disabled() {
        assert_eq!(clamp_jitter(f64::NAN), 0.0);
        assert_eq!(clamp_jitter(-1.0), 0.0);
    }

    #[rstest]
    fn pool_timeouts_are_backend_errors() {
        assert!(matches!(
            map_pool_error(RunError::TimedOut),
            SegmentCacheError::Backend { .. }
        ));
    }
}
