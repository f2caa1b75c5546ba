//! Recipe story backend.
//!
//! Serves LLM-generated narrative segments for recipes. Segments are cached,
//! generated at most once per key at a time, and warmed ahead of the reader
//! by a bounded prefetch scheduler.

pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use middleware::Trace;
