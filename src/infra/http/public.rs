use std::{io::ErrorKind, sync::Arc};

use axum::{
    Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, FromRef, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::{Multipart, multipart::MultipartError};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;
use url::form_urlencoded;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        feed::{FeedError, FeedService},
        follows::{FollowError, FollowService},
        posts::{EditAccess, FormErrors, ImageUpload, PostError, PostForm, PostService},
        repos::HealthRepo,
    },
    cache::{CacheState, response_cache_layer},
    domain::entities::{PostRecord, UserRecord},
    infra::uploads::{UploadStorage, UploadStorageError},
    presentation::views::{
        FeedContext, FollowTemplate, GroupContext, GroupTemplate, IndexTemplate, LayoutChrome,
        LayoutContext, PostDetailContext, PostDetailTemplate, PostFormContext, PostFormTemplate,
        ProfileContext, ProfileTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    auth::{AuthConfig, MaybeViewer, Viewer, ViewerResolver, resolve_viewer},
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub health: Arc<dyn HealthRepo>,
    pub upload_storage: Arc<UploadStorage>,
    pub auth: AuthConfig,
    pub cache: Option<CacheState>,
    pub upload_limit_bytes: usize,
}

impl FromRef<HttpState> for AuthConfig {
    fn from_ref(state: &HttpState) -> Self {
        state.auth.clone()
    }
}

pub fn build_router(state: HttpState, resolver: ViewerResolver) -> Router {
    // Only the global feed is cached.
    let cached_routes = Router::new().route("/", get(index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let upload_limit = DefaultBodyLimit::max(state.upload_limit_bytes);

    let routes = Router::new()
        .route("/group/{slug}/", get(group_index))
        .route("/profile/{username}/", get(profile))
        .route("/profile/{username}/follow/", get(profile_follow))
        .route("/profile/{username}/unfollow/", get(profile_unfollow))
        .route("/follow/", get(follow_index))
        .route("/posts/{id}/", get(post_detail))
        .route(
            "/posts/{id}/edit/",
            get(post_edit_form)
                .post(post_edit)
                .layer(upload_limit.clone()),
        )
        .route("/posts/{id}/comment/", post(add_comment))
        .route(
            "/create/",
            get(post_create_form)
                .post(post_create)
                .layer(upload_limit),
        )
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(public_health))
        .fallback(not_found);

    cached_routes
        .merge(routes)
        .with_state(state)
        .layer(middleware::from_fn_with_state(resolver, resolve_viewer))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentForm {
    text: String,
}

async fn index(
    State(state): State<HttpState>,
    viewer: MaybeViewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = layout_chrome(&state, viewer.username());

    match state.feed.global(query.page.as_deref()).await {
        Ok(page) => {
            let view = LayoutContext::new(chrome, FeedContext::global(&page));
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn group_index(
    State(state): State<HttpState>,
    viewer: MaybeViewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = layout_chrome(&state, viewer.username());

    match state.feed.group(&slug, query.page.as_deref()).await {
        Ok(feed) => {
            let view = LayoutContext::new(chrome, GroupContext::from_feed(&feed));
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn profile(
    State(state): State<HttpState>,
    viewer: MaybeViewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = layout_chrome(&state, viewer.username());

    match state
        .feed
        .profile(&username, viewer.0.as_ref(), query.page.as_deref())
        .await
    {
        Ok(feed) => {
            let content = ProfileContext::from_feed(&feed, viewer.username());
            let view = LayoutContext::new(chrome, content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = layout_chrome(&state, Some(&user.username));

    match state.feed.follow_feed(&user, query.page.as_deref()).await {
        Ok(page) => {
            let view = LayoutContext::new(chrome, FeedContext::follow(&page));
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn profile_follow(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    Path(username): Path<String>,
) -> Response {
    let result = state.follows.follow(&user, &username).await;
    follow_result_to_response(&state, &user, &username, result.map(|_| ()))
}

async fn profile_unfollow(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    Path(username): Path<String>,
) -> Response {
    let result = state.follows.unfollow(&user, &username).await;
    follow_result_to_response(&state, &user, &username, result.map(|_| ()))
}

fn follow_result_to_response(
    state: &HttpState,
    user: &UserRecord,
    username: &str,
    result: Result<(), FollowError>,
) -> Response {
    match result {
        Ok(()) => redirect_to(&profile_path(username)),
        Err(FollowError::UnknownAuthor(_)) => {
            render_not_found_response(layout_chrome(state, Some(&user.username)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    viewer: MaybeViewer,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = layout_chrome(&state, viewer.username());
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.feed.post_detail(id).await {
        Ok(detail) => {
            let content = PostDetailContext::from_detail(&detail, viewer.username());
            let view = LayoutContext::new(chrome, content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn post_create_form(State(state): State<HttpState>, Viewer(user): Viewer) -> Response {
    render_create_form(&state, &user, &PostForm::default(), FormErrors::default()).await
}

async fn post_create(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    mut multipart: Multipart,
) -> Response {
    let form = match read_post_form(&mut multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    match state.posts.create(&user, &form).await {
        Ok(_) => redirect_to(&profile_path(&user.username)),
        Err(PostError::Invalid(errors)) => render_create_form(&state, &user, &form, errors).await,
        Err(err) => post_error_to_response(&state, &user, err),
    }
}

async fn post_edit_form(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(layout_chrome(&state, Some(&user.username)));
    };

    match state.posts.edit_access(&user, id).await {
        Ok(EditAccess::Allowed(post)) => {
            let form = form_from_post(&post);
            render_edit_form(&state, &user, &post, &form, FormErrors::default()).await
        }
        Ok(EditAccess::NotAuthor(id)) => redirect_to(&post_path(id)),
        Err(err) => post_error_to_response(&state, &user, err),
    }
}

async fn post_edit(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(layout_chrome(&state, Some(&user.username)));
    };
    let form = match read_post_form(&mut multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    match state.posts.edit(&user, id, &form).await {
        Ok(EditAccess::Allowed(post)) => redirect_to(&post_path(post.id)),
        Ok(EditAccess::NotAuthor(id)) => redirect_to(&post_path(id)),
        Err(PostError::Invalid(errors)) => match state.posts.edit_access(&user, id).await {
            Ok(EditAccess::Allowed(post)) => {
                render_edit_form(&state, &user, &post, &form, errors).await
            }
            Ok(EditAccess::NotAuthor(id)) => redirect_to(&post_path(id)),
            Err(err) => post_error_to_response(&state, &user, err),
        },
        Err(err) => post_error_to_response(&state, &user, err),
    }
}

async fn add_comment(
    State(state): State<HttpState>,
    Viewer(user): Viewer,
    Path(raw_id): Path<String>,
    Form(comment): Form<CommentForm>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(layout_chrome(&state, Some(&user.username)));
    };

    match state.posts.comment(&user, id, &comment.text).await {
        Ok(_) => redirect_to(&post_path(id)),
        Err(err) => post_error_to_response(&state, &user, err),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn not_found(State(state): State<HttpState>, viewer: MaybeViewer) -> Response {
    render_not_found_response(layout_chrome(&state, viewer.username()))
}

async fn render_create_form(
    state: &HttpState,
    user: &UserRecord,
    form: &PostForm,
    errors: FormErrors,
) -> Response {
    let chrome = layout_chrome(state, Some(&user.username));
    match state.feed.list_groups().await {
        Ok(groups) => {
            let content = PostFormContext::create(&groups, form, errors);
            let view = LayoutContext::new(chrome, content);
            render_template_response(PostFormTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn render_edit_form(
    state: &HttpState,
    user: &UserRecord,
    post: &PostRecord,
    form: &PostForm,
    errors: FormErrors,
) -> Response {
    let chrome = layout_chrome(state, Some(&user.username));
    match state.feed.list_groups().await {
        Ok(groups) => {
            let content =
                PostFormContext::edit(post.id, &groups, form, post.image.as_deref(), errors);
            let view = LayoutContext::new(chrome, content);
            render_template_response(PostFormTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn read_post_form(multipart: &mut Multipart) -> Result<PostForm, HttpError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => form.text = field.text().await.map_err(multipart_error)?,
            Some("group") => form.group = field.text().await.map_err(multipart_error)?,
            Some("image_clear") => {
                let value = field.text().await.map_err(multipart_error)?;
                form.image_clear = matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "on" | "true" | "1" | "yes"
                );
            }
            Some("image") => {
                let file_name = field.file_name().map(str::to_string).unwrap_or_default();
                let data = field.bytes().await.map_err(multipart_error)?;
                // Browsers submit an empty, unnamed part when no file was chosen.
                if !file_name.trim().is_empty() || !data.is_empty() {
                    form.image = Some(ImageUpload { file_name, data });
                }
            }
            _ => continue,
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError) -> HttpError {
    HttpError::from_error(
        "infra::http::public::read_post_form",
        err.status(),
        "Invalid form submission",
        &err,
    )
}

fn form_from_post(post: &PostRecord) -> PostForm {
    PostForm {
        text: post.text.clone(),
        group: post.group_id.map(|id| id.to_string()).unwrap_or_default(),
        image: None,
        image_clear: false,
    }
}

fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        FeedError::UnknownGroup(_) | FeedError::UnknownAuthor(_) | FeedError::UnknownPost(_) => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_error(
                "infra::http::feed_error_to_response",
                StatusCode::NOT_FOUND,
                &err,
            )
            .attach(&mut response);
            response
        }
        err => HttpError::from(err).into_response(),
    }
}

fn post_error_to_response(state: &HttpState, user: &UserRecord, err: PostError) -> Response {
    match err {
        PostError::UnknownPost(_) => {
            let mut response = render_not_found_response(layout_chrome(state, Some(&user.username)));
            ErrorReport::from_error(
                "infra::http::post_error_to_response",
                StatusCode::NOT_FOUND,
                &err,
            )
            .attach(&mut response);
            response
        }
        err => HttpError::from(err).into_response(),
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

fn layout_chrome(state: &HttpState, viewer: Option<&str>) -> LayoutChrome {
    LayoutChrome {
        viewer: viewer.map(str::to_string),
        login_url: state.auth.login_url.clone(),
    }
}

fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn redirect_to(location: &str) -> Response {
    Redirect::to(location).into_response()
}

pub(crate) fn profile_path(username: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(username.as_bytes()).collect();
    format!("/profile/{encoded}/")
}

pub(crate) fn post_path(id: i64) -> String {
    format!("/posts/{id}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_ids_must_be_positive_integers() {
        assert_eq!(parse_post_id("42"), Some(42));
        assert_eq!(parse_post_id("0"), None);
        assert_eq!(parse_post_id("-3"), None);
        assert_eq!(parse_post_id("abc"), None);
    }

    #[test]
    fn profile_paths_are_percent_encoded() {
        assert_eq!(profile_path("leo"), "/profile/leo/");
        assert_eq!(profile_path("jane+blog@home"), "/profile/jane%2Bblog%40home/");
    }

    #[test]
    fn media_responses_carry_guessed_type() {
        let response = build_media_response("posts/cat.png", Bytes::from_static(b"png"));
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
    }
}
