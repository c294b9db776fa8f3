use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    routing::get,
};
use metrics_util::debugging::DebuggingRecorder;
use quill::cache::{
    CacheConfig, CacheState, METRIC_RESPONSE_CLEAR, METRIC_RESPONSE_EVICT,
    METRIC_RESPONSE_EXPIRED, METRIC_RESPONSE_HIT, METRIC_RESPONSE_MISS, MemoryResponseStore,
    response_cache_layer,
};
use tower::ServiceExt;

#[tokio::test(start_paused = true)]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let config = CacheConfig {
        capacity: NonZeroUsize::new(1).expect("non-zero"),
        ..Default::default()
    };
    let store = Arc::new(MemoryResponseStore::new(&config));
    let cache_state = CacheState::new(config, store);

    let app = Router::new()
        .route("/", get(|| async { "feed" }))
        .layer(middleware::from_fn_with_state(
            cache_state.clone(),
            response_cache_layer,
        ));

    // miss, hit, miss + evict, then expiry after the TTL.
    for uri in ["/", "/", "/?page=2"] {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    tokio::time::advance(Duration::from_secs(21)).await;
    let request = Request::builder()
        .uri("/?page=2")
        .body(Body::empty())
        .expect("request should build");
    app.clone().oneshot(request).await.expect("router should respond");

    cache_state.clear();

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        METRIC_RESPONSE_HIT,
        METRIC_RESPONSE_MISS,
        METRIC_RESPONSE_EVICT,
        METRIC_RESPONSE_EXPIRED,
        METRIC_RESPONSE_CLEAR,
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
