use std::sync::Arc;

use bytes::Bytes;
use imagesize::ImageError;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};
use crate::domain::posts::normalize_text;
use crate::infra::uploads::{UploadStorage, UploadStorageError};

/// Directory (relative to the upload root) holding post images.
pub const POST_IMAGE_PREFIX: &str = "posts";

/// An image file submitted with a post form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

/// Submitted post form values, kept verbatim so an invalid form can be re-rendered.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    /// Raw `group` select value; empty means no group.
    pub group: String,
    pub image: Option<ImageUpload>,
    pub image_clear: bool,
}

/// Per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    pub text: Option<String>,
    pub group: Option<String>,
    pub image: Option<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.group.is_none() && self.image.is_none()
    }
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("unknown post {0}")]
    UnknownPost(i64),
    #[error("submitted form is invalid")]
    Invalid(FormErrors),
    #[error("failed to store post image")]
    Storage(#[from] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Whether the viewer may edit a post.
#[derive(Debug, Clone)]
pub enum EditAccess {
    Allowed(PostRecord),
    /// The viewer is not the author; the post stays untouched.
    NotAuthor(i64),
}

struct ValidatedPost {
    text: String,
    group_id: Option<i64>,
}

/// Write side of posts: create, edit and comment.
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    storage: Arc<UploadStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        storage: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            storage,
        }
    }

    pub async fn create(
        &self,
        author: &UserRecord,
        form: &PostForm,
    ) -> Result<PostRecord, PostError> {
        let validated = self.validate(form).await?;
        let image = match &form.image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };

        let post = match self
            .writer
            .create_post(CreatePostParams {
                text: validated.text,
                author_id: author.id,
                group_id: validated.group_id,
                image: image.clone(),
            })
            .await
        {
            Ok(post) => post,
            Err(err) => {
                if let Some(stored) = image.as_deref() {
                    self.discard_image(stored).await;
                }
                return Err(err.into());
            }
        };

        info!(
            target = "application::posts::create",
            post_id = post.id,
            author = %author.username,
            "post created"
        );
        Ok(post)
    }

    pub async fn edit_access(
        &self,
        viewer: &UserRecord,
        post_id: i64,
    ) -> Result<EditAccess, PostError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::UnknownPost(post_id))?;

        if post.author_id != viewer.id {
            return Ok(EditAccess::NotAuthor(post.id));
        }
        Ok(EditAccess::Allowed(post))
    }

    /// Apply an edit. Non-authors get [`EditAccess::NotAuthor`] and nothing changes.
    pub async fn edit(
        &self,
        viewer: &UserRecord,
        post_id: i64,
        form: &PostForm,
    ) -> Result<EditAccess, PostError> {
        let post = match self.edit_access(viewer, post_id).await? {
            EditAccess::Allowed(post) => post,
            denied @ EditAccess::NotAuthor(_) => {
                warn!(
                    target = "application::posts::edit",
                    post_id,
                    viewer = %viewer.username,
                    "edit attempted by non-author"
                );
                return Ok(denied);
            }
        };

        let validated = self.validate(form).await?;
        let (image, fresh_upload) = match (&form.image, form.image_clear) {
            (Some(upload), _) => (Some(self.store_image(upload).await?), true),
            (None, true) => (None, false),
            (None, false) => (post.image.clone(), false),
        };

        let updated = match self
            .writer
            .update_post(UpdatePostParams {
                id: post.id,
                text: validated.text,
                group_id: validated.group_id,
                image: image.clone(),
            })
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                if let Some(stored) = image.as_deref().filter(|_| fresh_upload) {
                    self.discard_image(stored).await;
                }
                return Err(err.into());
            }
        };

        if let Some(previous) = post.image.as_deref()
            && image.as_deref() != Some(previous)
        {
            self.discard_image(previous).await;
        }

        info!(
            target = "application::posts::edit",
            post_id = updated.id,
            "post updated"
        );
        Ok(EditAccess::Allowed(updated))
    }

    /// Add a comment. Blank text is dropped silently and yields `None`.
    pub async fn comment(
        &self,
        author: &UserRecord,
        post_id: i64,
        text: &str,
    ) -> Result<Option<CommentRecord>, PostError> {
        self.posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::UnknownPost(post_id))?;

        let Ok(text) = normalize_text("text", text) else {
            return Ok(None);
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(Some(comment))
    }

    async fn validate(&self, form: &PostForm) -> Result<ValidatedPost, PostError> {
        let mut errors = FormErrors::default();

        let text = match normalize_text("text", &form.text) {
            Ok(text) => Some(text),
            Err(_) => {
                errors.text = Some("This field is required.".to_string());
                None
            }
        };

        let group_id = match form.group.trim() {
            "" => None,
            raw => {
                let known = match raw.parse::<i64>() {
                    Ok(id) => self.groups.find_by_id(id).await?.map(|group| group.id),
                    Err(_) => None,
                };
                if known.is_none() {
                    errors.group = Some(
                        "Select a valid choice. That choice is not one of the available choices."
                            .to_string(),
                    );
                }
                known
            }
        };

        if let Some(upload) = &form.image
            && let Err(message) = check_image(&upload.data)
        {
            errors.image = Some(message.to_string());
        }

        match text {
            Some(text) if errors.is_empty() => Ok(ValidatedPost { text, group_id }),
            _ => Err(PostError::Invalid(errors)),
        }
    }

    async fn store_image(&self, upload: &ImageUpload) -> Result<String, PostError> {
        let stored = self
            .storage
            .store_in(POST_IMAGE_PREFIX, &upload.file_name, upload.data.clone())
            .await?;
        Ok(stored.stored_path)
    }

    async fn discard_image(&self, stored_path: &str) {
        if let Err(err) = self.storage.delete(stored_path).await {
            warn!(
                target = "application::posts::discard_image",
                path = stored_path,
                error = %err,
                "failed to remove post image"
            );
        }
    }
}

fn check_image(data: &[u8]) -> Result<(), &'static str> {
    match imagesize::blob_size(data) {
        Ok(_) => Ok(()),
        Err(ImageError::NotSupported) | Err(ImageError::CorruptedImage) => Err(
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        ),
        Err(ImageError::IoError(_)) => Err("The submitted file could not be read."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
    ];

    #[test]
    fn gif_passes_image_check() {
        assert!(check_image(GIF_1X1).is_ok());
    }

    #[test]
    fn text_file_fails_image_check() {
        assert!(check_image(b"definitely not an image").is_err());
    }

    #[test]
    fn empty_form_errors_report_empty() {
        assert!(FormErrors::default().is_empty());
        let errors = FormErrors {
            text: Some("required".into()),
            ..FormErrors::default()
        };
        assert!(!errors.is_empty());
    }
}
