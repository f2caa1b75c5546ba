//! Story pipeline façade.
//!
//! [`StoryPipeline`] is the single entry point adapters call. It validates
//! the request against recipe metadata, resolves the segment through the
//! singleflight coordinator, and hands the served position to the prefetch
//! scheduler before returning.
//!
//! Generating segment *n* first resolves segment *n-1* through the same
//! coordinator so its text can be quoted as context. That resolution is
//! deduplicated like any other request. A generation failure there fails
//! segment *n* too, so one request never spends more than one retry budget.
//! Any other failure leaves segment *n* to be generated without context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mockable::Clock;
use tracing::{debug, info, warn};

use crate::domain::ports::{
    GenerationFailureKind, RecipeCatalogue, RecipeCatalogueError, SegmentCache, StoryMetrics,
    TextGenerator,
};
use crate::domain::prefetch_scheduler::{PrefetchConfig, PrefetchScheduler, PrefetchTarget};
use crate::domain::segment_coordinator::{GenerationFuture, JobOrigin, SegmentCoordinator};
use crate::domain::story_generation::{GenerationClient, GenerationClientConfig, GenerationRuntime};
use crate::domain::{Error, ErrorCode, RecipeId, RecipeMeta, Segment, SegmentKey};

fn map_catalogue_error(error: RecipeCatalogueError) -> Error {
    match error {
        RecipeCatalogueError::Unavailable { message } => {
            Error::service_unavailable(format!("recipe catalogue unavailable: {message}"))
        }
    }
}

/// Tuning for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPipelineConfig {
    /// Lifetime of a cached segment.
    pub cache_ttl: Duration,
    /// Generation client timeouts and retries.
    pub generation: GenerationClientConfig,
    /// Prefetch reach and limits.
    pub prefetch: PrefetchConfig,
}

impl Default for StoryPipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            generation: GenerationClientConfig::default(),
            prefetch: PrefetchConfig::default(),
        }
    }
}

/// Driven ports the pipeline depends on.
pub struct StoryPipelinePorts {
    /// Recipe metadata source.
    pub catalogue: Arc<dyn RecipeCatalogue>,
    /// Segment cache.
    pub cache: Arc<dyn SegmentCache>,
    /// LLM capability.
    pub generator: Arc<dyn TextGenerator>,
    /// Counters sink.
    pub metrics: Arc<dyn StoryMetrics>,
}

#[derive(Clone)]
struct PipelineCore {
    catalogue: Arc<dyn RecipeCatalogue>,
    coordinator: SegmentCoordinator,
    generation: Arc<GenerationClient>,
    metrics: Arc<dyn StoryMetrics>,
}

impl PipelineCore {
    async fn recipe(&self, recipe_id: &RecipeId) -> Result<RecipeMeta, Error> {
        self.catalogue
            .recipe_metadata(recipe_id)
            .await
            .map_err(map_catalogue_error)?
            .ok_or_else(|| Error::not_found(format!("recipe {recipe_id} not found")))
    }

    fn resolve(
        &self,
        recipe: Arc<RecipeMeta>,
        key: SegmentKey,
        origin: JobOrigin,
    ) -> BoxFuture<'static, Result<Segment, Error>> {
        let core = self.clone();
        async move {
            let generate = {
                let core = core.clone();
                let key = key.clone();
                move || core.generate_text(recipe, key, origin)
            };
            core.coordinator.resolve(&key, origin, generate).await
        }
        .boxed()
    }

    fn generate_text(self, recipe: Arc<RecipeMeta>, key: SegmentKey, origin: JobOrigin) -> GenerationFuture {
        async move {
            let context = match key.previous() {
                Some(previous) => {
                    match self.resolve(Arc::clone(&recipe), previous.clone(), origin).await {
                        Ok(segment) => Some(segment.text().to_owned()),
                        // The prior job already spent the retry budget.
                        Err(error) if is_generation_failure(&error) => return Err(error),
                        Err(error) => {
                            warn!(
                                segment = %previous,
                                error = %error,
                                "prior segment unavailable; generating without context"
                            );
                            None
                        }
                    }
                }
                None => None,
            };

            match self
                .generation
                .generate(&recipe, key.index(), context.as_deref())
                .await
            {
                Ok(text) => Ok(text),
                Err(error) => {
                    self.record_failure(error.failure_kind()).await;
                    Err(error.into())
                }
            }
        }
        .boxed()
    }

    async fn record_failure(&self, kind: GenerationFailureKind) {
        if let Err(error) = self.metrics.record_generation_failure(kind).await {
            warn!(error = %error, kind = kind.as_str(), "failed to record generation failure");
        }
    }
}

fn is_generation_failure(error: &Error) -> bool {
    matches!(
        error.code(),
        ErrorCode::GenerationFailed | ErrorCode::GenerationTimeout
    )
}

#[async_trait]
impl PrefetchTarget for PipelineCore {
    async fn story_length(&self, recipe_id: &RecipeId) -> Result<Option<u32>, Error> {
        let recipe = self
            .catalogue
            .recipe_metadata(recipe_id)
            .await
            .map_err(map_catalogue_error)?;
        Ok(recipe.map(|meta| meta.segment_count))
    }

    async fn resolve_for_prefetch(&self, key: &SegmentKey) -> Result<Segment, Error> {
        let recipe = self.recipe(key.recipe_id()).await?;
        self.resolve(Arc::new(recipe), key.clone(), JobOrigin::Prefetch)
            .await
    }
}

/// Entry point serving recipe story segments.
#[derive(Clone)]
pub struct StoryPipeline {
    core: PipelineCore,
    scheduler: PrefetchScheduler,
}

impl StoryPipeline {
    /// Build a pipeline with the default retry runtime.
    pub fn new(ports: StoryPipelinePorts, clock: Arc<dyn Clock>, config: StoryPipelineConfig) -> Self {
        Self::with_runtime(ports, clock, GenerationRuntime::default(), config)
    }

    /// Build a pipeline with injected retry sleeping and jitter.
    pub fn with_runtime(
        ports: StoryPipelinePorts,
        clock: Arc<dyn Clock>,
        runtime: GenerationRuntime,
        config: StoryPipelineConfig,
    ) -> Self {
        let StoryPipelinePorts {
            catalogue,
            cache,
            generator,
            metrics,
        } = ports;
        let coordinator = SegmentCoordinator::new(cache, Arc::clone(&clock), config.cache_ttl);
        let generation = Arc::new(GenerationClient::with_runtime(
            generator,
            clock,
            runtime,
            config.generation,
        ));
        let core = PipelineCore {
            catalogue,
            coordinator: coordinator.clone(),
            generation,
            metrics: Arc::clone(&metrics),
        };
        let scheduler = PrefetchScheduler::new(
            coordinator,
            Arc::new(core.clone()),
            metrics,
            config.prefetch,
        );
        Self { core, scheduler }
    }

    /// Return segment `index` of `recipe_id`'s story.
    ///
    /// Unknown recipes and indices past the end of the story are
    /// `NotFound`. Concurrent calls for the same segment share one
    /// generation.
    ///
    /// # Examples
    /// ```rust,ignore
    /// let segment = pipeline.get_segment(&RecipeId::new("r1")?, 0).await?;
    /// println!("{}", segment.text());
    /// ```
    pub async fn get_segment(&self, recipe_id: &RecipeId, index: u32) -> Result<Segment, Error> {
        let recipe = self.core.recipe(recipe_id).await?;
        if !recipe.has_segment(index) {
            return Err(Error::not_found(format!(
                "segment {index} of recipe {recipe_id} does not exist"
            )));
        }

        let key = SegmentKey::new(recipe_id.clone(), index);
        match self
            .core
            .resolve(Arc::new(recipe), key, JobOrigin::Foreground)
            .await
        {
            Ok(segment) => {
                self.scheduler.touch(recipe_id, index);
                info!(
                    recipe_id = %recipe_id,
                    index,
                    origin = segment.origin().as_str(),
                    bytes = segment.size_bytes(),
                    "segment served"
                );
                if let Err(error) = self.core.metrics.record_segment_served(segment.origin()).await {
                    warn!(error = %error, "failed to record served segment");
                }
                Ok(segment)
            }
            Err(error) => {
                if error.code() == ErrorCode::InternalError {
                    self.core.record_failure(GenerationFailureKind::InternalError).await;
                }
                debug!(recipe_id = %recipe_id, index, error = %error, "segment request failed");
                Err(error)
            }
        }
    }

    /// Note that `index` of `recipe_id` was shown, scheduling prefetch of
    /// what follows. Never blocks and never fails.
    pub fn touch(&self, recipe_id: &RecipeId, index: u32) {
        self.scheduler.touch(recipe_id, index);
    }

    /// Drop one cached segment so the next request regenerates it.
    pub async fn invalidate_segment(&self, recipe_id: &RecipeId, index: u32) {
        let key = SegmentKey::new(recipe_id.clone(), index);
        self.core.coordinator.invalidate(&key).await;
    }

    /// Prefetch tasks currently outstanding.
    pub fn active_prefetches(&self) -> usize {
        self.scheduler.active_prefetches()
    }

    /// Wait for every outstanding prefetch task to finish.
    pub async fn drain_prefetches(&self) {
        self.scheduler.drain().await;
    }
}

#[cfg(test)]
#[path = "story_pipeline_tests.rs"]
mod tests;
