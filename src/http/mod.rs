//! HTTP API for the scheduling dashboard.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/optimize-schedule` | Optimize a production schedule |
//! | POST | `/execute-optimization` | Run a custom scheduling script |
//! | GET | `/health` | Solver liveness check |
//!
//! Malformed JSON bodies are rejected by the axum extractor (400/422).

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::OptimizerService;

/// Shared state for handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub service: OptimizerService,
}

/// Builds the router with CORS and request tracing.
pub fn build_router(service: OptimizerService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/optimize-schedule", post(handlers::optimize_schedule))
        .route("/execute-optimization", post(handlers::execute_optimization))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ApiState { service })
}
