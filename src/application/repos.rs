//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageWindow;
use crate::domain::entities::{
    CommentEntry, CommentRecord, FeedEntry, GroupRecord, PostRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which posts a feed selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    All,
    Group(i64),
    Author(i64),
    /// Posts by every author the given user follows.
    FollowedBy(i64),
}

/// Relations joined alongside each post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Include {
    pub author: bool,
    pub group: bool,
}

impl Include {
    pub const AUTHOR: Include = Include {
        author: true,
        group: false,
    };
    pub const GROUP: Include = Include {
        author: false,
        group: true,
    };
    pub const ALL: Include = Include {
        author: true,
        group: true,
    };
}

/// A feed selection ordered by `created_at DESC, id DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    pub scope: FeedScope,
    pub include: Include,
}

impl FeedQuery {
    pub fn global() -> Self {
        Self {
            scope: FeedScope::All,
            include: Include::ALL,
        }
    }

    pub fn group(group_id: i64) -> Self {
        Self {
            scope: FeedScope::Group(group_id),
            include: Include::AUTHOR,
        }
    }

    pub fn author(author_id: i64) -> Self {
        Self {
            scope: FeedScope::Author(author_id),
            include: Include::GROUP,
        }
    }

    pub fn followed_by(user_id: i64) -> Self {
        Self {
            scope: FeedScope::FollowedBy(user_id),
            include: Include::ALL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub text: String,
    pub author_id: i64,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateGroupParams {
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn count_feed(&self, scope: FeedScope) -> Result<u64, RepoError>;

    async fn list_feed(
        &self,
        query: FeedQuery,
        window: PageWindow,
    ) -> Result<Vec<FeedEntry>, RepoError>;

    /// Post with both author and group resolved.
    async fn find_entry(&self, id: i64) -> Result<Option<FeedEntry>, RepoError>;

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    /// Returns whether a row was removed.
    async fn delete_post(&self, id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError>;

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError>;

    /// Returns whether a row was removed.
    async fn delete_by_slug(&self, slug: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Comments on a post, newest first, with their authors.
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentEntry>, RepoError>;

    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;

    /// Insert the edge unless it exists. Returns whether a row was created.
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;

    /// Remove the edge if present. Returns whether a row was removed.
    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_sites_pick_their_relations() {
        assert_eq!(FeedQuery::global().include, Include::ALL);
        assert_eq!(FeedQuery::group(3).include, Include::AUTHOR);
        assert_eq!(FeedQuery::author(4).include, Include::GROUP);
        assert_eq!(FeedQuery::followed_by(5).scope, FeedScope::FollowedBy(5));
    }
}
