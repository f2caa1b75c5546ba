//! Story backend entry point: loads settings, wires adapters, serves HTTP.

mod server;

use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetricsBuilder;
use color_eyre::eyre::{Result, WrapErr, eyre};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use backend::domain::ports::StoryMetrics;
use backend::inbound::http::health::HealthState;
#[cfg(feature = "metrics")]
use backend::outbound::metrics::PrometheusStoryMetrics;
use backend::settings::StorySettings;
use server::{ServerConfig, build_pipeline, create_server};

const PREFETCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = StorySettings::load().map_err(|err| eyre!("failed to load settings: {err}"))?;
    let bind_addr = settings.bind_addr()?;

    #[cfg(feature = "metrics")]
    let prometheus = PrometheusMetricsBuilder::new("story")
        .endpoint("/metrics")
        .build()
        .map_err(|err| eyre!("failed to configure Prometheus metrics: {err}"))?;
    #[cfg(feature = "metrics")]
    let metrics: Option<Arc<dyn StoryMetrics>> = Some(Arc::new(
        PrometheusStoryMetrics::new(&prometheus.registry)
            .wrap_err("story metrics registration failed")?,
    ));
    #[cfg(not(feature = "metrics"))]
    let metrics: Option<Arc<dyn StoryMetrics>> = None;

    let pipeline = Arc::new(build_pipeline(&settings, metrics).await?);
    let config = ServerConfig::new(bind_addr, Arc::clone(&pipeline));
    #[cfg(feature = "metrics")]
    let config = config.with_metrics(Some(prometheus));

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), config)
        .wrap_err_with(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, "story backend listening");
    server.await.wrap_err("HTTP server failed")?;

    health_state.mark_unhealthy();
    if tokio::time::timeout(PREFETCH_DRAIN_TIMEOUT, pipeline.drain_prefetches())
        .await
        .is_err()
    {
        warn!(
            active = pipeline.active_prefetches(),
            "prefetches still running at shutdown"
        );
    }
    Ok(())
}
