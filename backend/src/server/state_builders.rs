//! Builders wiring settings into the story pipeline's adapters.

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use mockable::DefaultClock;
use tracing::{info, warn};

use backend::domain::ports::{
    FixtureTextGenerator, NoOpStoryMetrics, SegmentCache, StoryMetrics, TextGenerator,
};
use backend::domain::{StoryPipeline, StoryPipelinePorts};
use backend::outbound::cache::{InMemorySegmentCache, RedisSegmentCache};
use backend::outbound::llm::HttpTextGenerator;
use backend::outbound::recipes::JsonRecipeCatalogue;
use backend::settings::{SettingsError, StorySettings};

/// Pick Redis when a URL is configured, otherwise a process-local cache.
async fn build_cache(settings: &StorySettings) -> Result<Arc<dyn SegmentCache>> {
    match settings.redis() {
        Some(redis) => {
            let cache = RedisSegmentCache::connect(&redis)
                .await
                .wrap_err("failed to connect the redis segment cache")?;
            info!(pool_size = redis.pool_size, "using redis segment cache");
            Ok(Arc::new(cache))
        }
        None => {
            let capacity = settings.memory_cache_capacity();
            info!(capacity, "using in-memory segment cache");
            Ok(Arc::new(InMemorySegmentCache::new(capacity)))
        }
    }
}

/// Use the HTTP provider when an API key is configured, otherwise the
/// fixture generator for local runs.
fn build_generator(settings: &StorySettings) -> Result<Arc<dyn TextGenerator>> {
    match settings.llm() {
        Ok(llm) => {
            info!(model = %llm.model, endpoint = %llm.endpoint, "using HTTP text generator");
            let generator =
                HttpTextGenerator::new(llm).wrap_err("failed to build the LLM HTTP client")?;
            Ok(Arc::new(generator))
        }
        Err(SettingsError::MissingApiKey) => {
            warn!("no LLM API key configured; serving fixture narrative");
            Ok(Arc::new(FixtureTextGenerator))
        }
        Err(err) => Err(err.into()),
    }
}

/// Build the pipeline from settings.
///
/// `metrics` defaults to a no-op recorder when `None`.
///
/// # Errors
/// Fails when the recipe dataset cannot be loaded, the cache cannot connect
/// or the provider settings are malformed.
pub async fn build_pipeline(
    settings: &StorySettings,
    metrics: Option<Arc<dyn StoryMetrics>>,
) -> Result<StoryPipeline> {
    let recipes_path = settings.recipes_path();
    let catalogue = JsonRecipeCatalogue::load(&recipes_path)
        .wrap_err_with(|| format!("failed to load recipes from {}", recipes_path.display()))?;
    let ports = StoryPipelinePorts {
        catalogue: Arc::new(catalogue),
        cache: build_cache(settings).await?,
        generator: build_generator(settings)?,
        metrics: metrics.unwrap_or_else(|| Arc::new(NoOpStoryMetrics)),
    };
    let config = settings.pipeline_config();
    info!(
        cache_ttl_secs = config.cache_ttl.as_secs(),
        prefetch_depth = config.prefetch.depth,
        max_retries = config.generation.max_retries,
        "story pipeline configured"
    );
    Ok(StoryPipeline::new(ports, Arc::new(DefaultClock), config))
}
