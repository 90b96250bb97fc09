use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// User row. Profile fields plus the embedded session window: `last_login`
/// is the epoch second of the last successful auth-affecting operation and
/// the signing time of every live token, `expires_in` the epoch second the
/// refresh token dies.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub last_login: i64,
    pub expires_in: i64,
}

/// Everything a new row needs; the rest of the columns take their defaults
/// (`role='user'`, inactive, zeroed session window).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already taken")]
    DuplicateUsername,

    #[error("lost update conflict")]
    Conflict,

    #[error(transparent)]
    Unavailable(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Guarded write: applies only while the stored `last_login` still equals
    /// `expected_last_login`, and writes all mutable columns in one statement
    /// so `last_login` and `expires_in` can never tear. Returns `false` when
    /// another writer won the race.
    async fn update(&self, user: &User, expected_last_login: i64) -> Result<bool, StoreError>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, is_active, is_superuser,
                   role, created_at, last_login, expires_in
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, is_active, is_superuser,
                   role, created_at, last_login, expires_in
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, is_active, is_superuser,
                      role, created_at, last_login, expires_in
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(classify)
    }

    async fn update(&self, user: &User, expected_last_login: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = $2, email = $3, password_hash = $4, is_active = $5,
                is_superuser = $6, role = $7, last_login = $8, expires_in = $9
            WHERE id = $1 AND last_login = $10
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(&user.role)
        .bind(user.last_login)
        .bind(user.expires_in)
        .bind(expected_last_login)
        .execute(&self.db)
        .await
        .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }
}

/// Postgres signals unique violations with code 23505.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateUsername;
        }
    }
    StoreError::Unavailable(err)
}
