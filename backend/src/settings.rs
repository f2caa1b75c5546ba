//! Service configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `STORY_*` environment variables and an
//! optional config file. Every tuning knob is optional; accessors supply the
//! defaults so an empty environment yields a working in-memory setup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::domain::StoryPipelineConfig;
use crate::domain::prefetch_scheduler::PrefetchConfig;
use crate::domain::story_generation::GenerationClientConfig;
use crate::outbound::cache::RedisCacheSettings;
use crate::outbound::llm::HttpTextGeneratorSettings;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LLM_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_LLM_MAX_TOKENS: u32 = 600;
const DEFAULT_LLM_TEMPERATURE: f32 = 0.8;
const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MEMORY_CACHE_CAPACITY: u64 = 10_000;

fn default_recipes_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("recipes.json")
}

/// Errors raised while turning settings into adapter configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The bind address does not parse as `host:port`.
    #[error("invalid bind address {value}: {source}")]
    BindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    /// The LLM endpoint is not a valid URL.
    #[error("invalid LLM endpoint {value}: {source}")]
    Endpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },
    /// No API key was configured for the LLM provider.
    #[error("STORY_LLM_API_KEY must be set")]
    MissingApiKey,
}

/// Configuration for the story service.
#[derive(Debug, Clone, Default, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "STORY")]
pub struct StorySettings {
    /// Socket address to listen on.
    pub bind_addr: Option<String>,
    /// JSON recipe dataset.
    pub recipes_path: Option<PathBuf>,
    /// Redis URL; the in-memory cache is used when absent.
    pub redis_url: Option<String>,
    /// Redis pool size.
    pub redis_pool_size: Option<u32>,
    /// Extra TTL fraction applied to Redis entries.
    pub cache_ttl_jitter: Option<f64>,
    /// Entry bound for the in-memory cache.
    pub memory_cache_capacity: Option<u64>,
    /// Cached segment lifetime in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Messages endpoint of the LLM provider.
    pub llm_endpoint: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_max_tokens: Option<u32>,
    pub llm_temperature: Option<f32>,
    /// Transport timeout for one provider request, in seconds.
    pub llm_request_timeout_secs: Option<u64>,
    /// Ceiling on one generation attempt, in milliseconds.
    pub generation_timeout_ms: Option<u64>,
    pub generation_max_retries: Option<u32>,
    pub generation_initial_backoff_ms: Option<u64>,
    pub generation_max_backoff_ms: Option<u64>,
    /// Characters of the previous segment quoted as context.
    pub generation_context_chars: Option<usize>,
    /// Segments warmed ahead of the one served; `0` disables prefetch.
    pub prefetch_depth: Option<u32>,
    pub prefetch_timeout_ms: Option<u64>,
    pub prefetch_per_recipe: Option<usize>,
    pub prefetch_pool_size: Option<usize>,
}

impl StorySettings {
    /// Parse the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::BindAddr`] when the value is not `host:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let value = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        value.parse().map_err(|source| SettingsError::BindAddr {
            value: value.to_owned(),
            source,
        })
    }

    /// Return the dataset path, falling back to the bundled fixture.
    pub fn recipes_path(&self) -> PathBuf {
        self.recipes_path
            .clone()
            .unwrap_or_else(default_recipes_path)
    }

    pub fn memory_cache_capacity(&self) -> u64 {
        self.memory_cache_capacity
            .unwrap_or(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Redis settings when a URL is configured.
    pub fn redis(&self) -> Option<RedisCacheSettings> {
        let url = self.redis_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        let mut settings = RedisCacheSettings::new(url);
        if let Some(pool_size) = self.redis_pool_size {
            settings.pool_size = pool_size;
        }
        if let Some(jitter) = self.cache_ttl_jitter {
            settings.ttl_jitter = jitter;
        }
        Some(settings)
    }

    /// Pipeline tuning with defaults for every unset knob.
    pub fn pipeline_config(&self) -> StoryPipelineConfig {
        let generation_defaults = GenerationClientConfig::default();
        let prefetch_defaults = PrefetchConfig::default();
        StoryPipelineConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            generation: GenerationClientConfig {
                attempt_timeout: millis_or(
                    self.generation_timeout_ms,
                    generation_defaults.attempt_timeout,
                ),
                max_retries: self
                    .generation_max_retries
                    .unwrap_or(generation_defaults.max_retries),
                initial_backoff: millis_or(
                    self.generation_initial_backoff_ms,
                    generation_defaults.initial_backoff,
                ),
                max_backoff: millis_or(
                    self.generation_max_backoff_ms,
                    generation_defaults.max_backoff,
                ),
                max_context_chars: self
                    .generation_context_chars
                    .unwrap_or(generation_defaults.max_context_chars),
            },
            prefetch: PrefetchConfig {
                depth: self.prefetch_depth.unwrap_or(prefetch_defaults.depth),
                timeout: millis_or(self.prefetch_timeout_ms, prefetch_defaults.timeout),
                max_per_recipe: self
                    .prefetch_per_recipe
                    .unwrap_or(prefetch_defaults.max_per_recipe),
                max_background: self
                    .prefetch_pool_size
                    .unwrap_or(prefetch_defaults.max_background),
            },
        }
    }

    /// Provider settings for the HTTP text generator.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint is not a URL or no API key is configured.
    pub fn llm(&self) -> Result<HttpTextGeneratorSettings, SettingsError> {
        let endpoint = self.llm_endpoint.as_deref().unwrap_or(DEFAULT_LLM_ENDPOINT);
        let endpoint = Url::parse(endpoint).map_err(|source| SettingsError::Endpoint {
            value: endpoint.to_owned(),
            source,
        })?;
        let api_key = self
            .llm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(SettingsError::MissingApiKey)?;
        Ok(HttpTextGeneratorSettings {
            endpoint,
            model: self
                .llm_model
                .clone()
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_owned()),
            api_key: Zeroizing::new(api_key.to_owned()),
            request_timeout: Duration::from_secs(
                self.llm_request_timeout_secs
                    .unwrap_or(DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
            ),
            max_tokens: self.llm_max_tokens.unwrap_or(DEFAULT_LLM_MAX_TOKENS),
            temperature: self.llm_temperature.unwrap_or(DEFAULT_LLM_TEMPERATURE),
        })
    }
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}
