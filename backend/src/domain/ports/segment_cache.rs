//! Port interface for caching generated segments.
//!
//! The pipeline only depends on this get/set/delete contract. Adapters must
//! be safe for concurrent use; callers treat every error as a soft failure.
use std::time::Duration;

use async_trait::async_trait;

use super::{SegmentCacheKey, define_port_error};
use crate::domain::Segment;

define_port_error! {
    /// Errors surfaced by the caching adapter.
    pub enum SegmentCacheError {
        /// Cache backend is unavailable or timing out.
        Backend { message: String } => "segment cache backend failure: {message}",
        /// Serialisation or deserialisation of cached content failed.
        Serialization { message: String } => "segment cache serialisation failed: {message}",
    }
}

/// Key/value store with per-entry expiry holding generated segments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SegmentCache: Send + Sync {
    /// Read a cached segment; `Ok(None)` covers both "never stored" and
    /// "expired".
    async fn get(&self, key: &SegmentCacheKey) -> Result<Option<Segment>, SegmentCacheError>;

    /// Store a segment for `ttl`.
    async fn set(
        &self,
        key: &SegmentCacheKey,
        segment: &Segment,
        ttl: Duration,
    ) -> Result<(), SegmentCacheError>;

    /// Remove a segment ahead of its expiry.
    async fn delete(&self, key: &SegmentCacheKey) -> Result<(), SegmentCacheError>;
}

/// Cache that never stores anything.
///
/// Useful when running without a cache backend: every lookup misses, so the
/// pipeline regenerates on each request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSegmentCache;

#[async_trait]
impl SegmentCache for DisabledSegmentCache {
    async fn get(&self, _key: &SegmentCacheKey) -> Result<Option<Segment>, SegmentCacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &SegmentCacheKey,
        _segment: &Segment,
        _ttl: Duration,
    ) -> Result<(), SegmentCacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &SegmentCacheKey) -> Result<(), SegmentCacheError> {
        Ok(())
    }
}
