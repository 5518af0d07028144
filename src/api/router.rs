//! Builds the full `/api` router: state, feedback-route rate limiting, and
//! the tracing/CORS layers that wrap everything. Mirrors the split between
//! router construction and the server's bind/serve lifecycle in `server.rs`.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::endpoints;
use super::middleware::rate_limit::limit_feedback;
use super::types::ApiContext;

pub fn build_router(ctx: ApiContext) -> Router {
    let feedback_routes = Router::new()
        .route("/feedback", post(endpoints::feedback::submit))
        .route("/feedback/:processing_id", get(endpoints::feedback::get))
        .route("/feedback/cleanup/:processing_id", post(endpoints::feedback::cleanup))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(limit_feedback))
        .layer(axum::Extension(ctx.clone()));

    let process_routes = Router::new()
        .route("/upload", post(endpoints::upload::upload))
        .route("/process/active", get(endpoints::process::active))
        .route("/process/:processing_id", post(endpoints::process::start))
        .route("/process/:processing_id/status", get(endpoints::process::status))
        .route("/process/:processing_id/result", get(endpoints::process::result))
        .with_state(ctx.clone());

    let admin_routes = Router::new()
        .route("/admin/dynamic-steps", get(endpoints::admin::list_steps).post(endpoints::admin::create_step))
        .route(
            "/admin/dynamic-steps/:id",
            put(endpoints::admin::update_step).delete(endpoints::admin::delete_step),
        )
        .route(
            "/admin/document-classes",
            get(endpoints::admin::list_classes).post(endpoints::admin::create_class),
        )
        .route(
            "/admin/document-classes/:id",
            put(endpoints::admin::update_class).delete(endpoints::admin::delete_class),
        )
        .route(
            "/admin/available-models",
            get(endpoints::admin::list_models).post(endpoints::admin::create_model),
        )
        .route(
            "/admin/available-models/:id",
            put(endpoints::admin::update_model).delete(endpoints::admin::delete_model),
        )
        .route(
            "/admin/ocr-configuration",
            get(endpoints::admin::get_ocr_configuration).put(endpoints::admin::update_ocr_configuration),
        )
        .route(
            "/admin/system-settings/:key",
            get(endpoints::admin::get_setting).put(endpoints::admin::put_setting),
        )
        .route("/admin/costs/summary", get(endpoints::admin::cost_summary))
        .with_state(ctx.clone());

    let health_routes = Router::new().route("/health", get(endpoints::health::check)).with_state(ctx);

    Router::new()
        .nest("/api", process_routes)
        .nest("/api", feedback_routes)
        .nest("/api", admin_routes)
        .nest("/api", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
