use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "server::http";

/// Logs each request on arrival and once more with its status and latency.
/// Server-side failures are raised to `warn`.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let has_auth = request.headers().contains_key(axum::http::header::AUTHORIZATION);

    debug!(target: LOG_TARGET, %method, %path, has_auth, "incoming request");

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        warn!(
            target: LOG_TARGET,
            %method,
            %path,
            status,
            duration_ms,
            "request failed"
        );
    } else {
        info!(
            target: LOG_TARGET,
            %method,
            %path,
            status,
            duration_ms,
            "request completed"
        );
    }

    response
}
