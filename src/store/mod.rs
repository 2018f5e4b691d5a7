//! Credential Store
//!
//! Owns the user identity record, including the salted password digest and
//! the single refresh-token slot. Every write is atomic at the level of one
//! record; [`CredentialStore::rotate_refresh_token`] is the compare-and-
//! overwrite that serializes racing refreshes.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::PasswordDigest;
use crate::error::AppError;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

pub(crate) const USER_NOT_FOUND: &str = "User does not exist";

/// Stored user record. Not serializable: use [`PublicUser`] for anything
/// that leaves the process.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password_hash: String,
    /// The one live refresh token, `None` when no session is active.
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Externally visible projection of a [`UserRecord`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for PublicUser {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            fullname: user.fullname,
            avatar: user.avatar,
            cover_image: user.cover_image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Fields required to create a record. Identity fields are expected to be
/// trimmed and case-normalized already.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password_hash: PasswordDigest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Avatar,
    CoverImage,
}

impl ImageKind {
    /// Multipart field name the image arrives under
    pub fn field_name(self) -> &'static str {
        match self {
            ImageKind::Avatar => "avatar",
            ImageKind::CoverImage => "coverImage",
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            ImageKind::Avatar => "avatar",
            ImageKind::CoverImage => "cover_image",
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a record whose username OR email matches. `None` arguments
    /// never match.
    async fn find_by_identifier(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;

    /// Insert a new record. Fails with `Conflict` on a duplicate username or
    /// email.
    async fn create(&self, user: NewUser) -> Result<UserRecord, AppError>;

    /// Unconditionally overwrite (or clear) the refresh-token slot.
    async fn update_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<UserRecord, AppError>;

    /// Replace the refresh token only if the slot still holds `current`.
    /// Returns `None` when another writer got there first.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<Option<UserRecord>, AppError>;

    async fn update_password_hash(
        &self,
        id: Uuid,
        digest: &PasswordDigest,
    ) -> Result<UserRecord, AppError>;

    async fn update_account_details(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> Result<UserRecord, AppError>;

    async fn update_image(&self, id: Uuid, kind: ImageKind, url: &str)
        -> Result<UserRecord, AppError>;
}

#[cfg(test)]
impl UserRecord {
    pub(crate) fn for_tests(username: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            fullname: "Test User".to_string(),
            avatar: "https://media.example.com/avatar.png".to_string(),
            cover_image: None,
            password_hash: "$2b$04$invalid".to_string(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}
