use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::blog::{page_offset, BlogContent, Comment, Page, PER_PAGE};

/// Load a blog post together with its author's username.
pub async fn get_blog(pool: &PgPool, blog_id: i64) -> Result<Option<BlogContent>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT b.id, b.title, b.tag, b.content, b.create_time, u.username
        FROM blogs b
        JOIN users u ON u.id = b.author_id
        WHERE b.id = $1
        "#,
    )
    .bind(blog_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(blog_from_row).transpose()
}

/// List posts newest first, optionally filtered by a substring of the
/// title or tag.
pub async fn list_blogs(
    pool: &PgPool,
    search: Option<&str>,
    page: u32,
) -> Result<Page<BlogContent>, sqlx::Error> {
    let pattern = search.map(|q| format!("%{}%", escape_like(q)));

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM blogs b
        WHERE $1::text IS NULL OR b.title LIKE $1 OR b.tag LIKE $1
        "#,
    )
    .bind(&pattern)
    .fetch_one(pool)
    .await?
    .try_get("total")?;

    let rows = sqlx::query(
        r#"
        SELECT b.id, b.title, b.tag, b.content, b.create_time, u.username
        FROM blogs b
        JOIN users u ON u.id = b.author_id
        WHERE $1::text IS NULL OR b.title LIKE $1 OR b.tag LIKE $1
        ORDER BY b.create_time DESC, b.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&pattern)
    .bind(i64::from(PER_PAGE))
    .bind(page_offset(page) as i64)
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(blog_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(Page::new(items, page, total.max(0) as u64))
}

/// Comments on a post, newest first.
pub async fn list_comments(
    pool: &PgPool,
    blog_id: i64,
    page: u32,
) -> Result<Page<Comment>, sqlx::Error> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM comments WHERE blog_id = $1")
        .bind(blog_id)
        .fetch_one(pool)
        .await?
        .try_get("total")?;

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.blog_id, c.comment, c.create_time, u.username
        FROM comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.blog_id = $1
        ORDER BY c.create_time DESC, c.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(blog_id)
    .bind(i64::from(PER_PAGE))
    .bind(page_offset(page) as i64)
    .fetch_all(pool)
    .await?;

    let items = rows
        .iter()
        .map(|r| {
            Ok(Comment {
                id: r.try_get("id")?,
                blog_id: r.try_get("blog_id")?,
                body: r.try_get("comment")?,
                author_name: r.try_get("username")?,
                created_at: r.try_get("create_time")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;
    Ok(Page::new(items, page, total.max(0) as u64))
}

fn blog_from_row(r: &PgRow) -> Result<BlogContent, sqlx::Error> {
    Ok(BlogContent {
        id: r.try_get("id")?,
        title: r.try_get("title")?,
        tag: r.try_get("tag")?,
        body: r.try_get("content")?,
        author_name: r.try_get("username")?,
        created_at: r.try_get("create_time")?,
    })
}

/// Escape `LIKE` metacharacters so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Insert a user, returning its id.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    email: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO users (username, password, email)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(email)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// Publish a blog post, returning its id.
pub async fn create_blog(
    pool: &PgPool,
    author_id: i64,
    title: &str,
    tag: &str,
    content: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO blogs (title, tag, content, author_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(tag)
    .bind(content)
    .bind(author_id)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// Comment on a post, returning its id.
pub async fn create_comment(
    pool: &PgPool,
    blog_id: i64,
    author_id: i64,
    comment: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO comments (comment, blog_id, author_id)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(comment)
    .bind(blog_id)
    .bind(author_id)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_metacharacters_are_escaped() {
        assert_eq!(escape_like("rust"), "rust");
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }
}
