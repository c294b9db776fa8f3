use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::application::error::HttpError;

use super::AdminState;

#[derive(Debug, Deserialize)]
pub(super) struct CreateUserBody {
    username: String,
}

pub(super) async fn admin_user_create(
    State(state): State<AdminState>,
    Json(body): Json<CreateUserBody>,
) -> Response {
    match state.admin.register_user(&body.username).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
