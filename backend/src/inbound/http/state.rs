//! Shared HTTP adapter state.
//!
//! Handlers receive this through `actix_web::web::Data`. It holds the
//! pipeline façade only, so handlers stay free of cache and provider
//! details.

use std::sync::Arc;

use crate::domain::StoryPipeline;

/// Dependency bundle for story handlers.
#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<StoryPipeline>,
}

impl HttpState {
    /// Wrap a pipeline for injection into handlers.
    ///
    /// # Examples
    /// ```rust,ignore
    /// let state = HttpState::new(Arc::new(pipeline));
    /// let app = App::new().app_data(web::Data::new(state));
    /// ```
    pub fn new(pipeline: Arc<StoryPipeline>) -> Self {
        Self { pipeline }
    }
}
