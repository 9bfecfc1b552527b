//! HTTP Metrics Middleware
//!
//! Records the request counter, the duration histogram, and the
//! in-flight gauge for every request passing through the router.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::metrics::{self, Timer};

/// Holds the in-flight gauge up; released when the request ends,
/// including on panic unwind.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::http_request_started();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::http_request_finished();
    }
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    // label by route template when matched, raw path otherwise
    let endpoint = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => request.uri().path().to_string(),
    };
    let verb = request.method().to_string();

    let _in_flight = InFlight::enter();
    let timer = Timer::new();

    let response = next.run(request).await;

    metrics::record_http_request(
        &verb,
        &endpoint,
        response.status().as_u16(),
        timer.elapsed_secs(),
    );
    response
}
