use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::error::HttpError;

use super::AdminState;

pub(super) async fn admin_post_delete(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Response {
    match state.admin.delete_post(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
