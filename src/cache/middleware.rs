//! Response cache middleware.
//!
//! Serves stored `200 OK` responses for GET requests and stores fresh ones.
//! Must run after viewer resolution so the key can vary on the viewer.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig,
    keys::ResponseCacheKey,
    store::{CachedResponse, ResponseStore},
};
use crate::infra::http::auth::CurrentUser;

const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state for middleware and the admin clear endpoint.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<dyn ResponseStore>,
}

impl CacheState {
    pub fn new(config: CacheConfig, store: Arc<dyn ResponseStore>) -> Self {
        Self { config, store }
    }

    /// Purge every stored response.
    pub fn clear(&self) {
        let entries = self.store.len();
        self.store.clear();
        debug!(target = "cache::middleware::clear", entries, "response cache cleared");
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.is_enabled() || request.method() != Method::GET {
        return next.run(request).await;
    }

    let viewer = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.0.username.as_str());
    let key = ResponseCacheKey::from_uri(&cache.config.key_prefix, request.uri(), viewer);

    if let Some(cached) = cache.store.get(&key) {
        debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
        return build_response(cached);
    }

    debug!(cache = "response", outcome = "miss", key = %key, "cache miss, executing handler");

    let response = next.run(request).await;

    if response.status() != StatusCode::OK || response.headers().contains_key(header::SET_COOKIE) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                target = "cache::middleware::response_cache_layer",
                key = %key,
                error = %err,
                "failed to buffer response body"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if bytes.len() > MAX_CACHED_BODY_BYTES {
        debug!(
            cache = "response",
            outcome = "skip",
            key = %key,
            size = bytes.len(),
            "response body too large to cache"
        );
        return Response::from_parts(parts, Body::from(bytes));
    }

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        body: bytes.clone(),
    };
    cache.store.set(key, cached, cache.config.ttl);

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::cache::MemoryResponseStore;

    fn cache_state() -> CacheState {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryResponseStore::new(&config));
        CacheState::new(config, store)
    }

    fn counting_app(state: CacheState, status: StatusCode) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = Arc::clone(&calls);
        let app = Router::new()
            .route(
                "/",
                get(move || {
                    let calls = Arc::clone(&handler_calls);
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        (status, format!("render {n}"))
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(state, response_cache_layer));
        (app, calls)
    }

    async fn fetch(app: &Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(body.to_vec()).expect("utf8"))
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let (app, calls) = counting_app(cache_state(), StatusCode::OK);

        assert_eq!(fetch(&app, "/").await.1, "render 1");
        assert_eq!(fetch(&app, "/").await.1, "render 1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(fetch(&app, "/?page=2").await.1, "render 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clearing_forces_a_fresh_render() {
        let state = cache_state();
        let (app, calls) = counting_app(state.clone(), StatusCode::OK);

        fetch(&app, "/").await;
        state.clear();
        assert_eq!(fetch(&app, "/").await.1, "render 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_ok_responses_are_not_stored() {
        let (app, calls) = counting_app(cache_state(), StatusCode::NOT_FOUND);

        assert_eq!(fetch(&app, "/").await.0, StatusCode::NOT_FOUND);
        fetch(&app, "/").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_bodies_are_served_but_not_stored() {
        let state = cache_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = Arc::clone(&calls);
        let app = Router::new()
            .route(
                "/",
                get(move || {
                    let calls = Arc::clone(&handler_calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "x".repeat(2 * MAX_CACHED_BODY_BYTES)
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                response_cache_layer,
            ));

        let (status, body) = fetch(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), 2 * MAX_CACHED_BODY_BYTES);

        fetch(&app, "/").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_passes_through() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let store = Arc::new(MemoryResponseStore::new(&config));
        let state = CacheState::new(config, store.clone());
        let (app, calls) = counting_app(state, StatusCode::OK);

        fetch(&app, "/").await;
        fetch(&app, "/").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }
}
