use std::time::Instant;

use axum::{
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use keystone_auth::AuthError;

/// Raw `Authorization` header value.
///
/// Absent is `Ok(None)`; a value that is not visible ASCII counts as a
/// malformed scheme.
pub fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    match headers.get(AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value.to_str().map(Some).map_err(|_| AuthError::Unauthorized),
    }
}

/// Logs one line per request. Headers and bodies are never logged.
pub async fn trace_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let res = next.run(req).await;

    tracing::info!(
        %method,
        path = %path,
        status = res.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    res
}
