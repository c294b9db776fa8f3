//! Operator actions exposed on the admin listener.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CreateGroupParams, GroupsRepo, PostsWriteRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, UserRecord};
use crate::domain::slug::{SlugError, derive_slug, is_valid_slug};

const MAX_USERNAME_CHARS: usize = 150;
const MAX_GROUP_TITLE_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("resource not found")]
    NotFound,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct AdminService {
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    posts: Arc<dyn PostsWriteRepo>,
}

impl AdminService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        posts: Arc<dyn PostsWriteRepo>,
    ) -> Self {
        Self {
            users,
            groups,
            posts,
        }
    }

    pub async fn register_user(&self, username: &str) -> Result<UserRecord, AdminError> {
        let username = username.trim();
        if !is_valid_username(username) {
            return Err(AdminError::Validation(format!(
                "username must be 1-{MAX_USERNAME_CHARS} letters, digits or @/./+/-/_"
            )));
        }

        let user = self.users.create_user(username).await?;
        info!(
            target = "application::admin::register_user",
            user_id = user.id,
            username = %user.username,
            "user registered"
        );
        Ok(user)
    }

    pub async fn create_group(
        &self,
        command: CreateGroupCommand,
    ) -> Result<GroupRecord, AdminError> {
        let title = command.title.trim().to_string();
        if title.is_empty() || title.chars().count() > MAX_GROUP_TITLE_CHARS {
            return Err(AdminError::Validation(format!(
                "title must be 1-{MAX_GROUP_TITLE_CHARS} characters"
            )));
        }

        let slug = match command.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                if !is_valid_slug(slug) {
                    return Err(AdminError::Validation(format!("invalid slug `{slug}`")));
                }
                slug.to_string()
            }
            _ => derive_slug(&title)?,
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug,
                description: command.description.trim().to_string(),
            })
            .await?;

        info!(
            target = "application::admin::create_group",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }

    /// Delete a group; its posts stay and lose their group.
    pub async fn delete_group(&self, slug: &str) -> Result<(), AdminError> {
        if !self.groups.delete_by_slug(slug).await? {
            return Err(AdminError::NotFound);
        }
        info!(target = "application::admin::delete_group", slug, "group deleted");
        Ok(())
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), AdminError> {
        if !self.posts.delete_post(id).await? {
            return Err(AdminError::NotFound);
        }
        info!(target = "application::admin::delete_post", post_id = id, "post deleted");
        Ok(())
    }
}

fn is_valid_username(value: &str) -> bool {
    !value.is_empty()
        && value.chars().count() <= MAX_USERNAME_CHARS
        && value
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'))
}
