//! Postgres-backed repository implementations.

mod comments;
mod follows;
mod groups;
mod posts;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{FeedScope, HealthRepo, Include, RepoError};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    /// Columns of a feed row. Relations that were not requested are selected as
    /// typed NULLs so every feed query decodes into the same row shape.
    fn push_feed_select(qb: &mut QueryBuilder<'_, Postgres>, include: Include) {
        qb.push("SELECT p.id, p.text, p.created_at, p.author_id, p.group_id, p.image, ");
        if include.author {
            qb.push("u.username AS author_username, u.created_at AS author_created_at, ");
        } else {
            qb.push(
                "NULL::text AS author_username, NULL::timestamptz AS author_created_at, ",
            );
        }
        if include.group {
            qb.push(
                "g.title AS group_title, g.slug AS group_slug, \
                 g.description AS group_description ",
            );
        } else {
            qb.push(
                "NULL::varchar AS group_title, NULL::text AS group_slug, \
                 NULL::text AS group_description ",
            );
        }
        qb.push("FROM posts p ");
    }

    fn push_feed_joins(qb: &mut QueryBuilder<'_, Postgres>, scope: FeedScope, include: Include) {
        if let FeedScope::FollowedBy(user_id) = scope {
            qb.push("INNER JOIN follows f ON f.author_id = p.author_id AND f.user_id = ");
            qb.push_bind(user_id);
            qb.push(" ");
        }
        if include.author {
            qb.push("INNER JOIN users u ON u.id = p.author_id ");
        }
        if include.group {
            qb.push("LEFT JOIN groups g ON g.id = p.group_id ");
        }
    }

    fn push_scope_conditions(qb: &mut QueryBuilder<'_, Postgres>, scope: FeedScope) {
        qb.push("WHERE 1=1 ");
        match scope {
            FeedScope::All | FeedScope::FollowedBy(_) => {}
            FeedScope::Group(group_id) => {
                qb.push("AND p.group_id = ");
                qb.push_bind(group_id);
                qb.push(" ");
            }
            FeedScope::Author(author_id) => {
                qb.push("AND p.author_id = ");
                qb.push_bind(author_id);
                qb.push(" ");
            }
        }
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}

#[async_trait]
impl HealthRepo for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
