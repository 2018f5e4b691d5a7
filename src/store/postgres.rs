use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, ImageKind, NewUser, UserRecord, USER_NOT_FOUND};
use crate::auth::PasswordDigest;
use crate::error::AppError;

const USER_COLUMNS: &str = "id, username, email, fullname, avatar, cover_image, \
                            password_hash, refresh_token, created_at, updated_at";

/// PostgreSQL-backed [`CredentialStore`]
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn found(user: Option<UserRecord>) -> Result<UserRecord, AppError> {
    user.ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identifier(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>, AppError> {
        if username.is_none() && email.is_none() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM users WHERE username = $1 OR email = $2 LIMIT 1",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, AppError> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, fullname, avatar, cover_image,
                               password_hash, refresh_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let created = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.fullname)
            .bind(&user.avatar)
            .bind(&user.cover_image)
            .bind(user.password_hash.as_str())
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn update_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<UserRecord, AppError> {
        let sql = format!(
            "UPDATE users SET refresh_token = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(token)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        found(user)
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        // Single statement: the row lock taken by UPDATE makes a concurrent
        // rotation re-evaluate the predicate against the new value.
        let sql = format!(
            r#"
            UPDATE users SET refresh_token = $3, updated_at = $4
            WHERE id = $1 AND refresh_token = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(current)
            .bind(replacement)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        digest: &PasswordDigest,
    ) -> Result<UserRecord, AppError> {
        let sql = format!(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(digest.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        found(user)
    }

    async fn update_account_details(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> Result<UserRecord, AppError> {
        let sql = format!(
            r#"
            UPDATE users SET fullname = $2, email = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(fullname)
            .bind(email)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        found(user)
    }

    async fn update_image(
        &self,
        id: Uuid,
        kind: ImageKind,
        url: &str,
    ) -> Result<UserRecord, AppError> {
        let sql = format!(
            "UPDATE users SET {} = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            kind.column(),
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(url)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        found(user)
    }
}
