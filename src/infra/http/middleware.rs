use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use metrics::histogram;
use tracing::{Level, event};
use uuid::Uuid;

use crate::application::error::ErrorReport;

use super::METRIC_HTTP_REQUEST_MS;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id carried in extensions and echoed as `x-request-id`.
#[derive(Clone, Debug)]
pub struct RequestId(pub HeaderValue);

/// Reuse the caller's `x-request-id` when it is present, otherwise mint one.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|value| !value.is_empty() && value.len() <= 64)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(id) = id else {
        return next.run(request).await;
    };

    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;
    response.headers_mut().insert(&REQUEST_ID_HEADER, id);
    response
}

/// Record latency for every request and log 4xx/5xx with the attached error chain.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.0.to_str().ok())
        .unwrap_or("")
        .to_owned();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let elapsed = start.elapsed();
    histogram!(METRIC_HTTP_REQUEST_MS).record(elapsed.as_secs_f64() * 1000.0);

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));

    macro_rules! emit {
        ($level:expr, $message:literal) => {
            event!(
                target: "quill::http::response",
                $level,
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed.as_millis() as u64,
                source,
                chain = ?chain,
                request_id = %request_id,
                $message
            )
        };
    }

    if status.is_server_error() {
        emit!(Level::ERROR, "request failed");
    } else {
        emit!(Level::WARN, "client request error");
    }

    response
}
