use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::application::admin::CreateGroupCommand;
use crate::application::error::HttpError;

use super::AdminState;

#[derive(Debug, Deserialize)]
pub(super) struct CreateGroupBody {
    title: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    description: String,
}

pub(super) async fn admin_group_create(
    State(state): State<AdminState>,
    Json(body): Json<CreateGroupBody>,
) -> Response {
    let command = CreateGroupCommand {
        title: body.title,
        slug: body.slug,
        description: body.description,
    };

    match state.admin.create_group(command).await {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn admin_group_delete(
    State(state): State<AdminState>,
    Path(slug): Path<String>,
) -> Response {
    match state.admin.delete_group(&slug).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
