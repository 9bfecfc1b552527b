use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::api::middleware::metrics::metrics_middleware;
use crate::config::HttpConfig;
use crate::AppState;

/// Read-endpoint router with the tracing, CORS, metrics, and request
/// timeout layers applied.
pub fn create_router(state: Arc<AppState>, http: &HttpConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::order::health_check))
        .route("/order", get(handlers::order::missing_order_uid))
        .route("/order/", get(handlers::order::missing_order_uid))
        .route("/order/:order_uid", get(handlers::order::get_order_by_uid))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(http.read_timeout))
        .with_state(state)
}
