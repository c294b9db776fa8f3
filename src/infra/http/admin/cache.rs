use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use super::AdminState;

pub(super) async fn invalidate_cache(State(state): State<AdminState>) -> Response {
    if let Some(cache) = state.cache.as_ref() {
        cache.clear();
    }
    info!(target = "infra::http::admin::invalidate_cache", "response cache invalidated");
    StatusCode::NO_CONTENT.into_response()
}
