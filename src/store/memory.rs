use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CredentialStore, ImageKind, NewUser, UserRecord, USER_NOT_FOUND};
use crate::auth::PasswordDigest;
use crate::error::AppError;

/// Process-local [`CredentialStore`] for tests and local experiments.
///
/// All reads and writes go through one mutex, so each operation observes
/// and mutates a record atomically.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
    writes: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations since creation
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, UserRecord>>, AppError> {
        self.users
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))
    }

    fn modify<F>(&self, id: Uuid, apply: F) -> Result<UserRecord, AppError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut users = self.lock()?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;
        apply(user);
        user.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(user.clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identifier(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>, AppError> {
        let users = self.lock()?;
        let found = users.values().find(|u| {
            username.map_or(false, |name| u.username == name)
                || email.map_or(false, |mail| u.email == mail)
        });
        Ok(found.cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, AppError> {
        let mut users = self.lock()?;
        if users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(AppError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            fullname: user.fullname,
            avatar: user.avatar,
            cover_image: user.cover_image,
            password_hash: user.password_hash.into_inner(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<UserRecord, AppError> {
        self.modify(id, |user| user.refresh_token = token.map(str::to_string))
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        let mut users = self.lock()?;
        let user = match users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(current) => user,
            _ => return Ok(None),
        };
        user.refresh_token = Some(replacement.to_string());
        user.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(user.clone()))
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        digest: &PasswordDigest,
    ) -> Result<UserRecord, AppError> {
        self.modify(id, |user| user.password_hash = digest.as_str().to_string())
    }

    async fn update_account_details(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> Result<UserRecord, AppError> {
        let mut users = self.lock()?;
        if users.values().any(|u| u.id != id && u.email == email) {
            return Err(AppError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;
        user.fullname = fullname.to_string();
        user.email = email.to_string();
        user.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(user.clone())
    }

    async fn update_image(
        &self,
        id: Uuid,
        kind: ImageKind,
        url: &str,
    ) -> Result<UserRecord, AppError> {
        self.modify(id, |user| match kind {
            ImageKind::Avatar => user.avatar = url.to_string(),
            ImageKind::CoverImage => user.cover_image = Some(url.to_string()),
        })
    }
}
