//! Viewer resolution from the trusted authentication header.
//!
//! Authentication itself happens upstream; the proxy forwards the signed-in
//! username in a configured header. The middleware turns that header into a
//! [`CurrentUser`] request extension and the extractors read it back.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderName, Request, Uri, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;
use url::form_urlencoded;

use crate::application::error::repo_error_to_http;
use crate::application::repos::UsersRepo;
use crate::config::AuthSettings;
use crate::domain::entities::UserRecord;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub user_header: HeaderName,
    pub login_url: String,
}

impl From<&AuthSettings> for AuthConfig {
    fn from(settings: &AuthSettings) -> Self {
        Self {
            user_header: settings.user_header.clone(),
            login_url: settings.login_url.clone(),
        }
    }
}

/// The signed-in user, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

#[derive(Clone)]
pub struct ViewerResolver {
    pub config: AuthConfig,
    pub users: Arc<dyn UsersRepo>,
}

pub async fn resolve_viewer(
    State(resolver): State<ViewerResolver>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let username = request
        .headers()
        .get(&resolver.config.user_header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    if let Some(username) = username {
        match resolver.users.find_by_username(&username).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(CurrentUser(user));
            }
            Ok(None) => {
                debug!(
                    target = "infra::http::auth::resolve_viewer",
                    username = %username,
                    "authenticated username has no account, treating as anonymous"
                );
            }
            Err(err) => {
                return repo_error_to_http("infra::http::auth::resolve_viewer", err)
                    .into_response();
            }
        }
    }

    next.run(request).await
}

/// Extractor for routes that require a signed-in user.
///
/// Anonymous requests are redirected to the login page with `next` pointing
/// back at the original path and query.
#[derive(Debug, Clone)]
pub struct Viewer(pub UserRecord);

impl<S> FromRequestParts<S> for Viewer
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<CurrentUser>() {
            Some(user) => Ok(Self(user.0.clone())),
            None => {
                let config = AuthConfig::from_ref(state);
                Err(login_redirect(&config.login_url, &parts.uri).into_response())
            }
        }
    }
}

/// Extractor for routes open to anonymous visitors.
#[derive(Debug, Clone)]
pub struct MaybeViewer(pub Option<UserRecord>);

impl MaybeViewer {
    pub fn username(&self) -> Option<&str> {
        self.0.as_ref().map(|user| user.username.as_str())
    }
}

impl<S> FromRequestParts<S> for MaybeViewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<CurrentUser>()
                .map(|user| user.0.clone()),
        ))
    }
}

/// `303 See Other` to the login page carrying the original location.
pub fn login_redirect(login_url: &str, original: &Uri) -> Redirect {
    let next = original
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{login_url}{separator}next={encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_encodes_next() {
        let uri: Uri = "/posts/3/edit/?page=2".parse().expect("uri");
        let response = login_redirect("/auth/login/", &uri).into_response();
        assert_eq!(response.status(), axum::http::StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "/auth/login/?next=%2Fposts%2F3%2Fedit%2F%3Fpage%3D2"
        );
    }

    #[test]
    fn login_redirect_appends_to_existing_query() {
        let uri: Uri = "/follow/".parse().expect("uri");
        let response = login_redirect("/login?source=quill", &uri).into_response();
        assert_eq!(
            response.headers()["location"],
            "/login?source=quill&next=%2Ffollow%2F"
        );
    }
}
