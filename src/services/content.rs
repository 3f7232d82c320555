use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::queries;
use crate::models::blog::{BlogContent, BlogQuery, Comment, Page};

/// Read access to published blog content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_by_id(&self, content_id: i64) -> Result<Option<BlogContent>, ContentError>;

    /// Newest posts first, filtered by the query's search term.
    async fn list(&self, query: &BlogQuery) -> Result<Page<BlogContent>, ContentError>;

    /// Newest comments on a post first.
    async fn comments(&self, blog_id: i64, page: u32) -> Result<Page<Comment>, ContentError>;

    async fn ping(&self) -> Result<(), ContentError>;
}

/// PostgreSQL-backed content store.
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn get_by_id(&self, content_id: i64) -> Result<Option<BlogContent>, ContentError> {
        Ok(queries::get_blog(&self.pool, content_id).await?)
    }

    async fn list(&self, query: &BlogQuery) -> Result<Page<BlogContent>, ContentError> {
        Ok(queries::list_blogs(&self.pool, query.search(), query.page()).await?)
    }

    async fn comments(&self, blog_id: i64, page: u32) -> Result<Page<Comment>, ContentError> {
        Ok(queries::list_comments(&self.pool, blog_id, page).await?)
    }

    async fn ping(&self) -> Result<(), ContentError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
