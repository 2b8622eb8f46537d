pub mod auth;
pub mod error;
pub mod generations;
pub mod images;
pub mod middleware;
pub mod simulation;
pub mod storage;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use studio_types::api::HealthResponse;

use crate::auth::AppState;
use crate::middleware::require_auth;
use crate::storage::UPLOADS_ROUTE;

/// Multipart framing on top of the largest accepted image.
const BODY_LIMIT: usize = generations::MAX_IMAGE_SIZE + 1024 * 1024;

/// All API routes plus static serving of stored artifacts.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/generations",
            post(generations::create_generation).get(generations::list_generations),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(state.artifacts.dir()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
