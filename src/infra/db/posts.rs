use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::pagination::PageWindow;
use crate::application::repos::{
    CreatePostParams, FeedQuery, FeedScope, Include, PostsRepo, PostsWriteRepo, RepoError,
    UpdatePostParams,
};
use crate::domain::entities::{FeedEntry, GroupRecord, PostRecord, UserRecord};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    created_at: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            created_at: row.created_at,
            author_id: row.author_id,
            group_id: row.group_id,
            image: row.image,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    #[sqlx(flatten)]
    post: PostRow,
    author_username: Option<String>,
    author_created_at: Option<OffsetDateTime>,
    group_title: Option<String>,
    group_slug: Option<String>,
    group_description: Option<String>,
}

impl From<FeedRow> for FeedEntry {
    fn from(row: FeedRow) -> Self {
        let post = PostRecord::from(row.post);

        let author = match (row.author_username, row.author_created_at) {
            (Some(username), Some(created_at)) => Some(UserRecord {
                id: post.author_id,
                username,
                created_at,
            }),
            _ => None,
        };

        let group = match (post.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(GroupRecord {
                id,
                title,
                slug,
                description: row.group_description.unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            post,
            author,
            group,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_feed(&self, scope: FeedScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p ");
        Self::push_feed_joins(&mut qb, scope, Include::default());
        Self::push_scope_conditions(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn list_feed(
        &self,
        query: FeedQuery,
        window: PageWindow,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let offset = i64::try_from(window.offset)
            .map_err(|_| RepoError::from_persistence("page offset exceeds supported range"))?;

        let mut qb = QueryBuilder::new("");
        Self::push_feed_select(&mut qb, query.include);
        Self::push_feed_joins(&mut qb, query.scope, query.include);
        Self::push_scope_conditions(&mut qb, query.scope);
        qb.push("ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(window.limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<FeedRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FeedEntry::from).collect())
    }

    async fn find_entry(&self, id: i64) -> Result<Option<FeedEntry>, RepoError> {
        let mut qb = QueryBuilder::new("");
        Self::push_feed_select(&mut qb, Include::ALL);
        Self::push_feed_joins(&mut qb, FeedScope::All, Include::ALL);
        qb.push("WHERE p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<FeedRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(FeedEntry::from))
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, text, created_at, author_id, group_id, image
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (text, author_id, group_id, image)
            VALUES ($1, $2, $3, $4)
            RETURNING id, text, created_at, author_id, group_id, image
            "#,
        )
        .bind(params.text)
        .bind(params.author_id)
        .bind(params.group_id)
        .bind(params.image)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts
            SET text = $2, group_id = $3, image = $4
            WHERE id = $1
            RETURNING id, text, created_at, author_id, group_id, image
            "#,
        )
        .bind(params.id)
        .bind(params.text)
        .bind(params.group_id)
        .bind(params.image)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
