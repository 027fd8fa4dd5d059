//! Route definitions and router construction.

use std::sync::Arc;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router, middleware};
use tower_http::trace::TraceLayer;

use crate::bootstrap::GatewayContext;
use crate::cors::cors;
use crate::dto::HealthDto;
use crate::error::HttpError;
use crate::handlers;
use crate::state::AppState;

/// AI routes, relative to the configured prefix.
///
/// Registered with `any` so the pipeline itself answers non-POST methods
/// with a JSON 405.
fn ai_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", any(handlers::ai::chat))
        .route("/vision", any(handlers::ai::vision))
        .route("/speech", any(handlers::ai::speech))
}

/// Build the full application router.
///
/// Layer order, outermost first: CORS, request tracing, routes.
pub fn create_router(ctx: GatewayContext) -> Router {
    let prefix = ctx.settings.route_prefix.clone();
    let state: AppState = Arc::new(ctx);

    let app = Router::new().route("/health", get(health_check));
    let app = if prefix.is_empty() {
        app.merge(ai_routes())
    } else {
        app.nest(&prefix, ai_routes())
    };

    app.fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors))
}

/// Liveness check. Unauthenticated and never rate limited.
pub async fn health_check() -> Json<HealthDto> {
    Json(HealthDto { status: "ok" })
}

async fn not_found(req: Request) -> impl IntoResponse {
    HttpError::NotFound(req.uri().path().to_string())
}
