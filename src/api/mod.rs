// ============================================================================
// HTTP surface
// ============================================================================
//
//   POST /api/publishOrder   validate and publish one order
//   GET  /health             aggregated component health (503 when unhealthy)
//   GET  /metrics            Prometheus text exposition
//
// ============================================================================

mod handlers;

use actix::Addr;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

use crate::actors::HealthMonitorActor;
use crate::messaging::OrderPublisher;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<OrderPublisher>,
    pub health: Addr<HealthMonitorActor>,
    pub metrics: Arc<Metrics>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/publishOrder", web::post().to(handlers::publish_order))
        .route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics));
}

pub async fn start_http_server(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    tracing::info!("Starting HTTP server on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}
