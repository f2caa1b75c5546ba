//! Segment cache adapters.
//!
//! - [`InMemorySegmentCache`]: process-local `moka` cache honouring the TTL
//!   passed on each write. Used when no Redis URL is configured.
//! - [`RedisSegmentCache`]: `bb8-redis` pool storing segments as JSON with
//!   jittered expiry, shared by every backend replica.
//!
//! Both honour the `SegmentCache` contract: `get` returns `None` for missing
//! and expired entries, and every backend fault becomes a
//! `SegmentCacheError` the coordinator downgrades to a miss.

mod in_memory;
mod redis;

pub use in_memory::InMemorySegmentCache;
pub use redis::{RedisCacheSettings, RedisSegmentCache};
