use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::application::error::{ErrorReport, HttpError};
use crate::application::feed::{GroupFeed, PostDetail, ProfileFeed};
use crate::application::pagination::Page;
use crate::application::posts::{FormErrors, PostForm};
use crate::domain::entities::{CommentEntry, FeedEntry, GroupRecord};
use crate::domain::posts::post_label;

const DISPLAY_DATE: &[FormatItem<'static>] =
    format_description!("[day] [month repr:short] [year]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Per-request page furniture: who is signed in and where to sign in.
#[derive(Clone, Debug)]
pub struct LayoutChrome {
    pub viewer: Option<String>,
    pub login_url: String,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub viewer: Option<String>,
    pub login_url: String,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self
    where
        T: PageTitle,
    {
        Self {
            title: content.page_title(),
            viewer: chrome.viewer,
            login_url: chrome.login_url,
            content,
        }
    }
}

/// Text shown in the `<title>` element.
pub trait PageTitle {
    fn page_title(&self) -> String;
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub label: String,
    pub text: String,
    pub published: String,
    pub iso_date: String,
    pub author: Option<String>,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
    pub image_url: Option<String>,
}

impl PostCard {
    pub fn from_entry(entry: &FeedEntry) -> Self {
        Self {
            id: entry.post.id,
            label: post_label(&entry.post.text),
            text: entry.post.text.clone(),
            published: format_date(entry.post.created_at),
            iso_date: format_iso(entry.post.created_at),
            author: entry.author.as_ref().map(|author| author.username.clone()),
            group_title: entry.group.as_ref().map(|group| group.title.clone()),
            group_slug: entry.group.as_ref().map(|group| group.slug.clone()),
            image_url: entry.post.image.as_deref().map(media_url),
        }
    }
}

#[derive(Clone)]
pub struct PageLink {
    pub number: u32,
    pub current: bool,
}

#[derive(Clone)]
pub struct PaginationView {
    pub number: u32,
    pub num_pages: u32,
    pub previous: Option<u32>,
    pub next: Option<u32>,
    pub links: Vec<PageLink>,
}

impl PaginationView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous: page.previous_number(),
            next: page.next_number(),
            links: page
                .page_numbers()
                .into_iter()
                .map(|number| PageLink {
                    number,
                    current: number == page.number,
                })
                .collect(),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

pub struct FeedContext {
    pub heading: String,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
    pub empty_message: &'static str,
}

impl FeedContext {
    pub fn global(page: &Page<FeedEntry>) -> Self {
        Self::new("Latest posts", page, "No posts yet.")
    }

    pub fn follow(page: &Page<FeedEntry>) -> Self {
        Self::new(
            "Posts from authors you follow",
            page,
            "Authors you follow have not posted anything yet.",
        )
    }

    fn new(heading: &str, page: &Page<FeedEntry>, empty_message: &'static str) -> Self {
        Self {
            heading: heading.to_string(),
            posts: page.items.iter().map(PostCard::from_entry).collect(),
            pagination: PaginationView::from_page(page),
            empty_message,
        }
    }
}

impl PageTitle for FeedContext {
    fn page_title(&self) -> String {
        self.heading.clone()
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedContext>,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl GroupContext {
    pub fn from_feed(feed: &GroupFeed) -> Self {
        Self {
            title: feed.group.title.clone(),
            description: feed.group.description.clone(),
            posts: feed.page.items.iter().map(PostCard::from_entry).collect(),
            pagination: PaginationView::from_page(&feed.page),
        }
    }
}

impl PageTitle for GroupContext {
    fn page_title(&self) -> String {
        format!("Posts in {}", self.title)
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
}

pub struct ProfileContext {
    pub username: String,
    pub post_count: u64,
    pub following: bool,
    /// Whether to offer follow/unfollow: signed in and not on their own profile.
    pub can_follow: bool,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl ProfileContext {
    pub fn from_feed(feed: &ProfileFeed, viewer: Option<&str>) -> Self {
        Self {
            username: feed.author.username.clone(),
            post_count: feed.post_count,
            following: feed.following,
            can_follow: viewer.is_some_and(|viewer| viewer != feed.author.username),
            posts: feed
                .page
                .items
                .iter()
                .map(|entry| {
                    let mut card = PostCard::from_entry(entry);
                    card.author = Some(feed.author.username.clone());
                    card
                })
                .collect(),
            pagination: PaginationView::from_page(&feed.page),
        }
    }
}

impl PageTitle for ProfileContext {
    fn page_title(&self) -> String {
        format!("Profile of {}", self.username)
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

pub struct CommentView {
    pub author: String,
    pub text: String,
    pub published: String,
}

impl CommentView {
    fn from_entry(entry: &CommentEntry) -> Self {
        Self {
            author: entry.author.username.clone(),
            text: entry.comment.text.clone(),
            published: format_date(entry.comment.created_at),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub author_post_count: u64,
    pub can_edit: bool,
    pub can_comment: bool,
    pub comments: Vec<CommentView>,
}

impl PostDetailContext {
    pub fn from_detail(detail: &PostDetail, viewer: Option<&str>) -> Self {
        let post = PostCard::from_entry(&detail.entry);
        let can_edit = match (viewer, post.author.as_deref()) {
            (Some(viewer), Some(author)) => viewer == author,
            _ => false,
        };

        Self {
            can_edit,
            can_comment: viewer.is_some(),
            author_post_count: detail.author_post_count,
            comments: detail.comments.iter().map(CommentView::from_entry).collect(),
            post,
        }
    }
}

impl PageTitle for PostDetailContext {
    fn page_title(&self) -> String {
        format!("Post {}", self.post.label)
    }
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct GroupOption {
    pub id: String,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub current_image: Option<String>,
    pub errors: FormErrors,
}

impl PostFormContext {
    pub fn create(groups: &[GroupRecord], form: &PostForm, errors: FormErrors) -> Self {
        Self {
            is_edit: false,
            action: "/create/".to_string(),
            text: form.text.clone(),
            groups: group_options(groups, form.group.trim()),
            current_image: None,
            errors,
        }
    }

    pub fn edit(
        post_id: i64,
        groups: &[GroupRecord],
        form: &PostForm,
        current_image: Option<&str>,
        errors: FormErrors,
    ) -> Self {
        Self {
            is_edit: true,
            action: format!("/posts/{post_id}/edit/"),
            text: form.text.clone(),
            groups: group_options(groups, form.group.trim()),
            current_image: current_image.map(media_url),
            errors,
        }
    }
}

impl PageTitle for PostFormContext {
    fn page_title(&self) -> String {
        if self.is_edit {
            "Edit post".to_string()
        } else {
            "New post".to_string()
        }
    }
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

impl PageTitle for ErrorPageView {
    fn page_title(&self) -> String {
        self.title.clone()
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

fn group_options(groups: &[GroupRecord], selected: &str) -> Vec<GroupOption> {
    groups
        .iter()
        .map(|group| {
            let id = group.id.to_string();
            GroupOption {
                selected: id == selected,
                id,
                title: group.title.clone(),
            }
        })
        .collect()
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{}", stored_path.trim_start_matches('/'))
}

fn format_date(value: OffsetDateTime) -> String {
    value
        .format(DISPLAY_DATE)
        .unwrap_or_else(|_| value.date().to_string())
}

fn format_iso(value: OffsetDateTime) -> String {
    value
        .to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::entities::{PostRecord, UserRecord};

    fn entry(text: &str) -> FeedEntry {
        FeedEntry {
            post: PostRecord {
                id: 7,
                text: text.to_string(),
                created_at: datetime!(2024-03-05 10:30:00 UTC),
                author_id: 1,
                group_id: Some(2),
                image: Some("posts/abc-cat.gif".to_string()),
            },
            author: Some(UserRecord {
                id: 1,
                username: "leo".to_string(),
                created_at: datetime!(2024-01-01 00:00:00 UTC),
            }),
            group: Some(GroupRecord {
                id: 2,
                title: "Cats".to_string(),
                slug: "cats".to_string(),
                description: "All about cats".to_string(),
            }),
        }
    }

    #[test]
    fn post_card_carries_relations_and_dates() {
        let card = PostCard::from_entry(&entry("A rather long post about cats"));
        assert_eq!(card.label, "A rather long p");
        assert_eq!(card.published, "05 Mar 2024");
        assert_eq!(card.iso_date, "2024-03-05T10:30:00Z");
        assert_eq!(card.author.as_deref(), Some("leo"));
        assert_eq!(card.group_slug.as_deref(), Some("cats"));
        assert_eq!(card.image_url.as_deref(), Some("/media/posts/abc-cat.gif"));
    }

    #[test]
    fn only_the_author_may_edit_from_detail() {
        let detail = PostDetail {
            entry: entry("hello"),
            author_post_count: 1,
            comments: Vec::new(),
        };
        assert!(PostDetailContext::from_detail(&detail, Some("leo")).can_edit);
        assert!(!PostDetailContext::from_detail(&detail, Some("mia")).can_edit);
        assert!(!PostDetailContext::from_detail(&detail, None).can_edit);
    }

    #[test]
    fn index_template_renders_cards_and_pager() {
        let items = (0..13).map(|_| entry("hello world")).collect();
        let page = Page::from_sequence(items, 10, Some("2"));
        let chrome = LayoutChrome {
            viewer: None,
            login_url: "/auth/login/".to_string(),
        };
        let html = IndexTemplate {
            view: LayoutContext::new(chrome, FeedContext::global(&page)),
        }
        .render()
        .expect("render");

        assert_eq!(html.matches("class=\"post-card\"").count(), 3);
        assert!(html.contains("href=\"?page=1\""));
        assert!(html.contains("/group/cats/"));
    }
}
