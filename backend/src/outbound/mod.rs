//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! This module follows the hexagonal architecture pattern, providing concrete
//! implementations of domain port traits for various infrastructure concerns:
//!
//! - **cache**: in-memory (moka) and Redis (bb8-redis) segment caches
//! - **llm**: reqwest client for an Anthropic-style messages endpoint
//! - **recipes**: JSON recipe dataset loaded through cap-std
//! - **metrics**: Prometheus-backed metrics exporters (feature-gated)
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod cache;
pub mod llm;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod recipes;
