//! HTTP server configuration object.

use std::net::SocketAddr;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetrics;

use backend::domain::StoryPipeline;

/// Everything the HTTP server needs once dependencies are built.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) pipeline: Arc<StoryPipeline>,
    #[cfg(feature = "metrics")]
    pub(crate) prometheus: Option<PrometheusMetrics>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(bind_addr: SocketAddr, pipeline: Arc<StoryPipeline>) -> Self {
        Self {
            bind_addr,
            pipeline,
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    #[cfg(feature = "metrics")]
    /// Attach Prometheus middleware serving `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, prometheus: Option<PrometheusMetrics>) -> Self {
        self.prometheus = prometheus;
        self
    }
}
