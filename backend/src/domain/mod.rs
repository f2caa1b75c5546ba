//! Domain primitives, ports and services for the recipe story pipeline.
//!
//! Purpose: keep the caching, deduplication, generation and prefetch rules
//! independent of transport and storage. Adapters in `inbound` and
//! `outbound` translate to and from these types.
//!
//! Public surface:
//! - Error (alias to `error::Error`): transport-agnostic failure payload.
//! - ErrorCode (alias to `error::ErrorCode`): stable error identifier.
//! - RecipeId / RecipeMeta: recipe identity and static metadata.
//! - SegmentKey / Segment / SegmentOrigin: the unit of narrative content.
//! - StoryPipeline: the façade adapters call.
//! - TraceId: request correlation identifier.

pub mod error;
pub mod ports;
pub mod prefetch_scheduler;
pub mod recipe;
pub mod segment;
pub mod segment_coordinator;
pub mod story_generation;
pub mod story_pipeline;
pub mod trace_id;

pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::recipe::{RecipeId, RecipeIdValidationError, RecipeMeta};
pub use self::segment::{Segment, SegmentKey, SegmentOrigin};
pub use self::story_pipeline::{StoryPipeline, StoryPipelineConfig, StoryPipelinePorts};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use backend::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::not_found("no such recipe"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
