//! Server construction and middleware wiring.

mod config;
mod state_builders;

pub use config::ServerConfig;
pub use state_builders::build_pipeline;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};

use backend::Trace;
use backend::inbound::http::health::{HealthState, live, ready};
use backend::inbound::http::state::HttpState;
use backend::inbound::http::stories::{get_initial_segment, get_story_segment, path_config};

/// Construct an Actix HTTP server serving story and health routes.
///
/// Readiness is flipped once the listener is bound.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let http_state = web::Data::new(HttpState::new(config.pipeline));
    #[cfg(feature = "metrics")]
    let prometheus = match config.prometheus {
        Some(prometheus) => prometheus,
        None => actix_web_prom::PrometheusMetricsBuilder::new("story")
            .build()
            .map_err(|err| std::io::Error::other(format!("metrics middleware failed: {err}")))?,
    };

    let server = HttpServer::new(move || {
        let api = web::scope("/api")
            .service(get_initial_segment)
            .service(get_story_segment);
        let app = App::new()
            .app_data(server_health_state.clone())
            .app_data(http_state.clone())
            .app_data(path_config())
            .wrap(Trace)
            .service(api)
            .service(ready)
            .service(live);

        #[cfg(feature = "metrics")]
        let app = app.wrap(prometheus.clone());

        app
    })
    .bind(config.bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
