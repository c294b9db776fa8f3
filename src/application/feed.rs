use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    CommentsRepo, FeedQuery, FeedScope, FollowsRepo, GroupsRepo, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentEntry, FeedEntry, GroupRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("unknown post {0}")]
    UnknownPost(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<FeedEntry>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub post_count: u64,
    pub following: bool,
    pub page: Page<FeedEntry>,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub entry: FeedEntry,
    /// Number of posts written by the post's author.
    pub author_post_count: u64,
    pub comments: Vec<CommentEntry>,
}

/// Read side of the blog: every feed plus the post detail view.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            comments,
        }
    }

    pub async fn global(
        &self,
        requested_page: Option<&str>,
    ) -> Result<Page<FeedEntry>, FeedError> {
        self.paginate(FeedQuery::global(), requested_page).await
    }

    pub async fn group(
        &self,
        slug: &str,
        requested_page: Option<&str>,
    ) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;
        let page = self
            .paginate(FeedQuery::group(group.id), requested_page)
            .await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        requested_page: Option<&str>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self.find_author(username).await?;
        let page = self
            .paginate(FeedQuery::author(author.id), requested_page)
            .await?;

        let following = match viewer {
            Some(viewer) if viewer.id != author.id => {
                self.follows.is_following(viewer.id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfileFeed {
            post_count: page.total_count,
            author,
            following,
            page,
        })
    }

    /// Posts by the authors `viewer` follows, newest first.
    pub async fn follow_feed(
        &self,
        viewer: &UserRecord,
        requested_page: Option<&str>,
    ) -> Result<Page<FeedEntry>, FeedError> {
        self.paginate(FeedQuery::followed_by(viewer.id), requested_page)
            .await
    }

    pub async fn post_detail(&self, id: i64) -> Result<PostDetail, FeedError> {
        let entry = self
            .posts
            .find_entry(id)
            .await?
            .ok_or(FeedError::UnknownPost(id))?;

        let author_post_count = self
            .posts
            .count_feed(FeedScope::Author(entry.post.author_id))
            .await?;
        let comments = self.comments.list_for_post(id).await?;

        Ok(PostDetail {
            entry,
            author_post_count,
            comments,
        })
    }

    pub async fn find_author(&self, username: &str) -> Result<UserRecord, FeedError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, FeedError> {
        Ok(self.groups.list_groups().await?)
    }

    async fn paginate(
        &self,
        query: FeedQuery,
        requested_page: Option<&str>,
    ) -> Result<Page<FeedEntry>, FeedError> {
        let total = self.posts.count_feed(query.scope).await?;
        let paginator = Paginator::for_posts(total);
        let window = paginator.window(requested_page);
        let items = self.posts.list_feed(query, window).await?;

        debug!(
            target = "application::feed::paginate",
            scope = ?query.scope,
            page = window.number,
            total,
            returned = items.len(),
            "feed page loaded"
        );

        Ok(Page::new(items, window, &paginator))
    }
}
