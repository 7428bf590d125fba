use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{collect, health_check, ingest_stats, AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    // The tracking script is embedded on third-party sites
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/collect", post(collect))
        .route("/health", get(health_check))
        .route("/stats/ingest", get(ingest_stats))
        .layer(cors)
        .with_state(state)
}
