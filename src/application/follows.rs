use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::follows::{FollowAction, follow_action};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// What a follow mutation did to the follow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    Removed,
    NotFollowing,
    /// Following yourself is ignored.
    SelfFollow,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        viewer: &UserRecord,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.resolve_author(username).await?;

        let outcome = match follow_action(viewer.id, author.id) {
            FollowAction::Ignore => FollowOutcome::SelfFollow,
            FollowAction::CreateIfAbsent => {
                if self.follows.follow(viewer.id, author.id).await? {
                    FollowOutcome::Created
                } else {
                    FollowOutcome::AlreadyFollowing
                }
            }
        };

        info!(
            target = "application::follows::follow",
            follower = %viewer.username,
            author = %author.username,
            outcome = ?outcome,
            "follow requested"
        );
        Ok(outcome)
    }

    pub async fn unfollow(
        &self,
        viewer: &UserRecord,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.resolve_author(username).await?;

        let outcome = if self.follows.unfollow(viewer.id, author.id).await? {
            FollowOutcome::Removed
        } else {
            FollowOutcome::NotFollowing
        };

        info!(
            target = "application::follows::unfollow",
            follower = %viewer.username,
            author = %author.username,
            outcome = ?outcome,
            "unfollow requested"
        );
        Ok(outcome)
    }

    async fn resolve_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
