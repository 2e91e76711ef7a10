//! Application setup and server configuration.

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::common::app_state::AppState;
use crate::server::middleware::extract_client_ip;
use crate::server::routes::health::health_handler;
use crate::server::routes::mining;

/// Build the Axum application router (spec §6's REST surface over the
/// mining engine, plus the health check).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/mining/jobs/:id/results", post(mining::submit_result).get(mining::list_results))
        .route("/api/mining/jobs/:id/import-all", post(mining::import_all))
        .route("/api/mining/jobs/:id/import-preview", get(mining::import_preview))
        .route("/api/mining/results/:id", patch(mining::update_result).delete(mining::delete_result))
        .layer(middleware::from_fn(extract_client_ip))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
