use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub created_at: OffsetDateTime,
}

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Post>> {
    let rows = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, title, description, created_by, created_at
        FROM posts
        ORDER BY created_at
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<Post>> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, title, description, created_by, created_at
        FROM posts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(post)
}

pub async fn insert(
    db: &PgPool,
    title: &str,
    description: &str,
    created_by: &str,
) -> anyhow::Result<Post> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (title, description, created_by)
        VALUES ($1, $2, $3)
        RETURNING id, title, description, created_by, created_at
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(created_by)
    .fetch_one(db)
    .await?;
    Ok(post)
}
