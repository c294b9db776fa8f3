//! In-memory repositories and request helpers shared by the HTTP tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;

use quill::application::admin::AdminService;
use quill::application::feed::FeedService;
use quill::application::follows::FollowService;
use quill::application::pagination::PageWindow;
use quill::application::posts::PostService;
use quill::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, FeedQuery, FeedScope,
    FollowsRepo, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
    UsersRepo,
};
use quill::cache::{CacheConfig, CacheState, MemoryResponseStore};
use quill::domain::entities::{
    CommentEntry, CommentRecord, FeedEntry, GroupRecord, PostRecord, UserRecord,
};
use quill::infra::http::{
    AdminState, AuthConfig, HttpState, ViewerResolver, build_admin_router, build_router,
};
use quill::infra::uploads::UploadStorage;

pub const USER_HEADER: &str = "x-remote-user";
pub const LOGIN_URL: &str = "/auth/login/";

#[derive(Default)]
struct State {
    next_id: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<(i64, i64)>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn in_scope(&self, post: &PostRecord, scope: FeedScope) -> bool {
        match scope {
            FeedScope::All => true,
            FeedScope::Group(id) => post.group_id == Some(id),
            FeedScope::Author(id) => post.author_id == id,
            FeedScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|(follower, author)| *follower == user_id && *author == post.author_id),
        }
    }

    fn user(&self, id: i64) -> Option<UserRecord> {
        self.users.iter().find(|user| user.id == id).cloned()
    }

    fn group(&self, id: Option<i64>) -> Option<GroupRecord> {
        let id = id?;
        self.groups.iter().find(|group| group.id == id).cloned()
    }
}

/// Repositories backed by plain vectors, mirroring the Postgres constraints
/// the handlers rely on.
#[derive(Default)]
pub struct MemoryRepos {
    state: Mutex<State>,
}

impl MemoryRepos {
    pub async fn seed_user(&self, username: &str) -> UserRecord {
        self.create_user(username).await.expect("seed user")
    }

    pub async fn seed_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("seed group")
    }

    pub async fn seed_post(
        &self,
        author: &UserRecord,
        text: &str,
        group: Option<&GroupRecord>,
    ) -> PostRecord {
        self.create_post(CreatePostParams {
            text: text.to_string(),
            author_id: author.id,
            group_id: group.map(|group| group.id),
            image: None,
        })
        .await
        .expect("seed post")
    }

    pub async fn follow_count(&self) -> usize {
        self.state.lock().await.follows.len()
    }

    pub async fn comment_count(&self) -> usize {
        self.state.lock().await.comments.len()
    }

    pub async fn latest_post(&self) -> Option<PostRecord> {
        self.state.lock().await.posts.last().cloned()
    }

    pub async fn post(&self, id: i64) -> Option<PostRecord> {
        self.find_post(id).await.expect("find post")
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn count_feed(&self, scope: FeedScope) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .filter(|post| state.in_scope(post, scope))
            .count() as u64)
    }

    async fn list_feed(
        &self,
        query: FeedQuery,
        window: PageWindow,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let state = self.state.lock().await;
        let mut posts: Vec<&PostRecord> = state
            .posts
            .iter()
            .filter(|post| state.in_scope(post, query.scope))
            .collect();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(posts
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .map(|post| FeedEntry {
                post: post.clone(),
                author: if query.include.author {
                    state.user(post.author_id)
                } else {
                    None
                },
                group: if query.include.group {
                    state.group(post.group_id)
                } else {
                    None
                },
            })
            .collect())
    }

    async fn find_entry(&self, id: i64) -> Result<Option<FeedEntry>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| FeedEntry {
                post: post.clone(),
                author: state.user(post.author_id),
                group: state.group(post.group_id),
            }))
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.posts.iter().find(|post| post.id == id).cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.user(params.author_id).is_none()
            || (params.group_id.is_some() && state.group(params.group_id).is_none())
        {
            return Err(RepoError::InvalidInput {
                message: "foreign key violation".to_string(),
            });
        }

        let post = PostRecord {
            id: state.next_id(),
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.posts.len();
        state.posts.retain(|post| post.id != id);
        state.comments.retain(|comment| comment.post_id != id);
        Ok(state.posts.len() != before)
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepos {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut groups = state.groups.clone();
        groups.sort_by(|a, b| (&a.title, a.id).cmp(&(&b.title, b.id)));
        Ok(groups)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.state.lock().await.group(Some(id)))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }

        let group = GroupRecord {
            id: state.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_by_slug(&self, slug: &str) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let Some(id) = state
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .map(|group| group.id)
        else {
            return Ok(false);
        };

        state.groups.retain(|group| group.id != id);
        for post in state.posts.iter_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|user| user.username == username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }

        let user = UserRecord {
            id: state.next_id(),
            username: username.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentEntry>, RepoError> {
        let state = self.state.lock().await;
        let mut comments: Vec<CommentEntry> = state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .filter_map(|comment| {
                state.user(comment.author_id).map(|author| CommentEntry {
                    comment: comment.clone(),
                    author,
                })
            })
            .collect();
        comments.sort_by(|a, b| {
            (b.comment.created_at, b.comment.id).cmp(&(a.comment.created_at, a.comment.id))
        });
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.lock().await;
        let comment = CommentRecord {
            id: state.next_id(),
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepos {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let state = self.state.lock().await;
        Ok(state.follows.contains(&(user_id, author_id)))
    }

    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        if state.follows.contains(&(user_id, author_id)) {
            return Ok(false);
        }
        state.follows.push((user_id, author_id));
        Ok(true)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.follows.len();
        state.follows.retain(|edge| *edge != (user_id, author_id));
        Ok(state.follows.len() != before)
    }
}

#[async_trait]
impl HealthRepo for MemoryRepos {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Public and admin routers wired to one [`MemoryRepos`].
pub struct TestApp {
    pub repos: Arc<MemoryRepos>,
    pub public: Router,
    pub admin: Router,
    pub cache: Option<CacheState>,
    pub media: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn with_cache() -> Self {
        Self::build(true)
    }

    fn build(cache_enabled: bool) -> Self {
        let repos = Arc::new(MemoryRepos::default());
        let media = tempfile::tempdir().expect("media dir");
        let storage =
            Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("upload storage"));

        let cache = cache_enabled.then(|| {
            let config = CacheConfig::default();
            let store = Arc::new(MemoryResponseStore::new(&config));
            CacheState::new(config, store)
        });

        let auth = AuthConfig {
            user_header: header::HeaderName::from_static(USER_HEADER),
            login_url: LOGIN_URL.to_string(),
        };

        let http_state = HttpState {
            feed: Arc::new(FeedService::new(
                repos.clone(),
                repos.clone(),
                repos.clone(),
                repos.clone(),
                repos.clone(),
            )),
            posts: Arc::new(PostService::new(
                repos.clone(),
                repos.clone(),
                repos.clone(),
                repos.clone(),
                storage.clone(),
            )),
            follows: Arc::new(FollowService::new(repos.clone(), repos.clone())),
            health: repos.clone(),
            upload_storage: storage,
            auth: auth.clone(),
            cache: cache.clone(),
            upload_limit_bytes: 5 * 1024 * 1024,
        };
        let admin_state = AdminState {
            admin: Arc::new(AdminService::new(
                repos.clone(),
                repos.clone(),
                repos.clone(),
            )),
            health: repos.clone(),
            cache: cache.clone(),
        };
        let resolver = ViewerResolver {
            config: auth,
            users: repos.clone(),
        };

        Self {
            public: build_router(http_state, resolver),
            admin: build_admin_router(admin_state),
            repos,
            cache,
            media,
        }
    }
}

/// Response pieces the tests inspect.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub fn request(method: Method, uri: &str, viewer: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(viewer) = viewer {
        builder = builder.header(USER_HEADER, viewer);
    }
    builder
}

pub async fn get(router: &Router, uri: &str, viewer: Option<&str>) -> TestResponse {
    let request = request(Method::GET, uri, viewer)
        .body(Body::empty())
        .expect("request");
    send(router, request).await
}

pub async fn post_form(
    router: &Router,
    uri: &str,
    viewer: Option<&str>,
    body: &str,
) -> TestResponse {
    let request = request(Method::POST, uri, viewer)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(router, request).await
}

pub async fn post_json(router: &Router, uri: &str, body: serde_json::Value) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(router, request).await
}

pub async fn delete(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(router, request).await
}

pub const BOUNDARY: &str = "quill-test-boundary";

/// One part of a multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(
    router: &Router,
    uri: &str,
    viewer: Option<&str>,
    parts: &[Part<'_>],
) -> TestResponse {
    let request = request(Method::POST, uri, viewer)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request");
    send(router, request).await
}

/// A valid 1x1 GIF.
pub const GIF_1X1: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];
