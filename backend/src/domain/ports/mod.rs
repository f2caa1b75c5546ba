//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod cache_key;
mod recipe_catalogue;
mod segment_cache;
mod story_metrics;
mod text_generator;

pub use cache_key::{SegmentCacheKey, SegmentCacheKeyValidationError};
#[cfg(test)]
pub use recipe_catalogue::MockRecipeCatalogue;
pub use recipe_catalogue::{FixtureRecipeCatalogue, RecipeCatalogue, RecipeCatalogueError};
#[cfg(test)]
pub use segment_cache::MockSegmentCache;
pub use segment_cache::{DisabledSegmentCache, SegmentCache, SegmentCacheError};
#[cfg(test)]
pub use story_metrics::MockStoryMetrics;
pub use story_metrics::{
    GenerationFailureKind, NoOpStoryMetrics, PrefetchOutcome, StoryMetrics, StoryMetricsError,
};
#[cfg(test)]
pub use text_generator::MockTextGenerator;
pub use text_generator::{FixtureTextGenerator, TextGenerator, TextGeneratorError};
