//! Operator listener: cache control, health and account bootstrap.
//!
//! Bound to a separate address so it can stay off the public network.

mod cache;
mod groups;
mod health;
mod posts;
mod state;
mod users;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_cache/invalidate", post(cache::invalidate_cache))
        .route("/_health/db", get(health::admin_health))
        .route("/users", post(users::admin_user_create))
        .route("/groups", post(groups::admin_group_create))
        .route("/groups/{slug}", delete(groups::admin_group_delete))
        .route("/posts/{id}", delete(posts::admin_post_delete))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
