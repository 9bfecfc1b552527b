//! Order Read Handlers
//!
//! Primary-key lookup with the wire contract: parameter validation,
//! error mapping, and the execution-time / server-timestamp response
//! headers. Plus the dependency-free health probe.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics;
use crate::models::OrderError;
use crate::AppState;

/// GET /order/:order_uid
pub async fn get_order_by_uid(
    State(state): State<Arc<AppState>>,
    Path(order_uid): Path<String>,
) -> Response {
    let timer = metrics::Timer::new();

    if order_uid.is_empty() {
        warn!("order_uid path parameter is empty");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_request",
                "message": "order_uid is required",
            })),
        )
            .into_response();
    }

    if order_uid.len() != 20 {
        warn!(order_uid, "order_uid has invalid length");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_order_uid",
                "message": "order_uid must be 20 characters long",
            })),
        )
            .into_response();
    }

    match state.orders.get_order(&order_uid).await {
        Ok(order) => {
            info!(order_uid, elapsed_ms = %timer.elapsed_millis(), "order retrieved");
            (
                StatusCode::OK,
                [
                    ("X-Execution-Time-MS", timer.elapsed_millis().to_string()),
                    (
                        "X-Server-Timestamp",
                        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
                ],
                Json(order),
            )
                .into_response()
        }
        Err(OrderError::NotFound) => {
            warn!(order_uid, "order not found");
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "not_found",
                    "message": "order not found",
                    "order_uid": order_uid,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(order_uid, error = %e, "failed to get order");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "internal_error",
                    "message": "failed to retrieve order",
                })),
            )
                .into_response()
        }
    }
}

/// GET /order — the path parameter is missing entirely.
pub async fn missing_order_uid() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid_request",
            "message": "order_uid is required",
        })),
    )
        .into_response()
}

/// GET /health — liveness only, no dependency probe.
pub async fn health_check() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "order-api",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })),
    )
        .into_response()
}
