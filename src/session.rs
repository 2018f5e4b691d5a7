//! Session Manager
//!
//! Orchestrates registration, login, logout, refresh rotation and password
//! change over the credential store, password hasher and token issuer.
//! Holds no state of its own. The refresh-token slot on the user record
//! moves between EMPTY and ACTIVE(token): login and rotation overwrite it,
//! logout empties it, so at most one refresh token per user is ever valid.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::auth::{PasswordHasher, TokenIssuer, TokenPair};
use crate::blob_store::BlobStore;
use crate::error::{AppError, AuthError, ValidationError};
use crate::store::{CredentialStore, NewUser, PublicUser, USER_NOT_FOUND};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username, optional, required};

/// Registration input as received from the transport layer
#[derive(Debug, Default, Clone)]
pub struct Registration {
    pub username: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub password: Option<String>,
    /// Locally spooled avatar file
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct LoginCredentials {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    blob_store: Arc<dyn BlobStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        blob_store: Arc<dyn BlobStore>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            store,
            blob_store,
            hasher,
            issuer,
        }
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Create a user record with a hashed password and uploaded avatar
    ///
    /// # Errors
    /// - Validation: a required field is blank, the avatar is missing, or
    ///   the avatar upload failed
    /// - Conflict: username or email already taken
    pub async fn register(&self, registration: Registration) -> Result<PublicUser, AppError> {
        let username = required("username", registration.username.as_deref())?;
        let email = required("email", registration.email.as_deref())?;
        let fullname = required("fullname", registration.fullname.as_deref())?;
        let password = registration
            .password
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ValidationError::EmptyField("password".to_string()))?;

        let username = is_valid_username(&username)?;
        let email = is_valid_email(&email)?;
        let fullname = is_valid_name(&fullname)?;

        if self
            .store
            .find_by_identifier(Some(&username), Some(&email))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }

        let avatar_path = registration
            .avatar
            .ok_or_else(|| ValidationError::MissingFile("avatar".to_string()))?;
        let avatar = self
            .blob_store
            .upload(&avatar_path)
            .await
            .ok_or_else(|| ValidationError::UploadFailed("avatar".to_string()))?;

        let cover_image = match registration.cover_image {
            Some(path) => self.blob_store.upload(&path).await.map(|asset| asset.url),
            None => None,
        };

        let password_hash = self.hasher.hash(&password)?;
        let user = self
            .store
            .create(NewUser {
                username,
                email,
                fullname,
                avatar: avatar.url,
                cover_image,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user.into())
    }

    /// Verify credentials and start a new session
    ///
    /// Any previously stored refresh token is overwritten, which ends the
    /// previous session. Exactly one store write happens on success and
    /// none on failure.
    pub async fn login(&self, credentials: LoginCredentials) -> Result<LoginOutcome, AppError> {
        let username = optional(credentials.username.as_deref()).map(|u| u.to_lowercase());
        let email = optional(credentials.email.as_deref()).map(|e| e.to_lowercase());
        if username.is_none() && email.is_none() {
            return Err(ValidationError::MissingIdentifier.into());
        }

        let user = self
            .store
            .find_by_identifier(username.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        let password = credentials.password.unwrap_or_default();
        if !self.hasher.verify(&password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issuer.issue_pair(&user)?;
        let user = self
            .store
            .update_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome {
            user: user.into(),
            tokens,
        })
    }

    /// End the session of an already authenticated user
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store.update_refresh_token(user_id, None).await?;

        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair (rotation-on-use)
    ///
    /// The cookie value takes precedence over the body value. The presented
    /// token must verify against the refresh key AND equal the value stored
    /// on the record; the swap to the new token is a compare-and-overwrite,
    /// so of two racing refreshes with the same token only one succeeds.
    pub async fn refresh(
        &self,
        cookie_token: Option<&str>,
        body_token: Option<&str>,
    ) -> Result<TokenPair, AppError> {
        let presented = cookie_token
            .filter(|t| !t.is_empty())
            .or_else(|| body_token.filter(|t| !t.is_empty()))
            .ok_or(AuthError::MissingToken)?;

        let claims = self.issuer.verify_refresh(presented)?;
        let user = self
            .store
            .find_by_id(claims.user_id()?)
            .await?
            .ok_or(AuthError::UnknownSubject)?;

        if user.refresh_token.as_deref() != Some(presented) {
            tracing::warn!(user_id = %user.id, "Superseded refresh token presented");
            return Err(AuthError::TokenReused.into());
        }

        let tokens = self.issuer.issue_pair(&user)?;
        self.store
            .rotate_refresh_token(user.id, presented, &tokens.refresh_token)
            .await?
            .ok_or(AuthError::TokenReused)?;

        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Replace the password after verifying the current one. The session
    /// slot is left untouched.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<(), AppError> {
        let old_password = old_password.unwrap_or_default();
        let new_password = new_password
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ValidationError::EmptyField("newPassword".to_string()))?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        if !self.hasher.verify(old_password, &user.password_hash)? {
            return Err(AuthError::WrongPassword.into());
        }

        let digest = self.hasher.hash(new_password)?;
        self.store.update_password_hash(user.id, &digest).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blob_store::UploadedAsset;
    use crate::configuration::JwtSettings;
    use crate::auth::PasswordDigest;
    use crate::store::{ImageKind, InMemoryCredentialStore, UserRecord};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::path::Path;

    pub(crate) struct StubBlobStore {
        pub fail: bool,
    }

    #[async_trait]
    impl BlobStore for StubBlobStore {
        async fn upload(&self, local_path: &Path) -> Option<UploadedAsset> {
            if self.fail {
                return None;
            }
            let name = local_path.file_name()?.to_str()?.to_string();
            Some(UploadedAsset {
                url: format!("https://media.test/{}", name),
                id: name,
            })
        }
    }

    pub(crate) fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_token_secret: "access-secret-key-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_secret: "refresh-secret-key-at-least-32-characters".to_string(),
            refresh_token_expiry: 864000,
            issuer: "test".to_string(),
        }
    }

    fn manager_with(store: Arc<InMemoryCredentialStore>, fail_uploads: bool) -> SessionManager {
        SessionManager::new(
            store,
            Arc::new(StubBlobStore { fail: fail_uploads }),
            PasswordHasher::new(4).unwrap(),
            TokenIssuer::new(&jwt_settings()),
        )
    }

    fn abby() -> Registration {
        Registration {
            username: Some("abby".to_string()),
            email: Some("a@x.com".to_string()),
            fullname: Some("Abby".to_string()),
            password: Some("p1".to_string()),
            avatar: Some(PathBuf::from("/tmp/avatar.png")),
            cover_image: None,
        }
    }

    fn abby_login() -> LoginCredentials {
        LoginCredentials {
            username: Some("abby".to_string()),
            email: None,
            password: Some("p1".to_string()),
        }
    }

    async fn registered() -> (Arc<InMemoryCredentialStore>, SessionManager, PublicUser) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store.clone(), false);
        let user = manager.register(abby()).await.expect("registration should succeed");
        (store, manager, user)
    }

    #[tokio::test]
    async fn register_stores_hash_not_plaintext() {
        let (store, _, user) = registered().await;

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "p1");
        assert!(stored.refresh_token.is_none());
        assert_eq!(user.avatar, "https://media.test/avatar.png");
    }

    #[tokio::test]
    async fn register_normalizes_identity_fields() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store, false);
        let mut registration = abby();
        registration.username = Some("  Abby ".to_string());
        registration.email = Some(" A@X.com".to_string());

        let user = manager.register(registration).await.unwrap();

        assert_eq!(user.username, "abby");
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn register_rejects_blank_fields() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store.clone(), false);
        let mut registration = abby();
        registration.fullname = Some("   ".to_string());

        assert_matches!(
            manager.register(registration).await,
            Err(AppError::Validation(ValidationError::EmptyField(field))) if field == "fullname"
        );
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn register_rejects_duplicates_case_insensitively() {
        let (_, manager, _) = registered().await;
        let mut registration = abby();
        registration.username = Some("ABBY".to_string());
        registration.email = Some("other@x.com".to_string());

        assert_matches!(manager.register(registration).await, Err(AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_requires_avatar() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store, false);
        let mut registration = abby();
        registration.avatar = None;

        assert_matches!(
            manager.register(registration).await,
            Err(AppError::Validation(ValidationError::MissingFile(_)))
        );
    }

    #[tokio::test]
    async fn register_fails_when_upload_fails() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store.clone(), true);

        assert_matches!(
            manager.register(abby()).await,
            Err(AppError::Validation(ValidationError::UploadFailed(_)))
        );
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn login_requires_an_identifier() {
        let (_, manager, _) = registered().await;
        let credentials = LoginCredentials {
            username: Some(" ".to_string()),
            email: None,
            password: Some("p1".to_string()),
        };

        assert_matches!(
            manager.login(credentials).await,
            Err(AppError::Validation(ValidationError::MissingIdentifier))
        );
    }

    #[tokio::test]
    async fn login_unknown_user_is_not_found() {
        let (_, manager, _) = registered().await;
        let credentials = LoginCredentials {
            username: None,
            email: Some("nobody@x.com".to_string()),
            password: Some("p1".to_string()),
        };

        assert_matches!(manager.login(credentials).await, Err(AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn login_with_wrong_password_writes_nothing() {
        let (store, manager, _) = registered().await;
        let writes_before = store.write_count();
        let credentials = LoginCredentials {
            password: Some("wrong".to_string()),
            ..abby_login()
        };

        assert_matches!(
            manager.login(credentials).await,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        );
        assert_eq!(store.write_count(), writes_before);
    }

    #[tokio::test]
    async fn login_persists_refresh_token_with_one_write() {
        let (store, manager, user) = registered().await;
        let writes_before = store.write_count();

        let outcome = manager.login(abby_login()).await.unwrap();

        assert_eq!(store.write_count(), writes_before + 1);
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(outcome.tokens.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn login_by_email_is_case_insensitive() {
        let (_, manager, user) = registered().await;
        let credentials = LoginCredentials {
            username: None,
            email: Some("A@X.COM".to_string()),
            password: Some("p1".to_string()),
        };

        assert_eq!(manager.login(credentials).await.unwrap().user.id, user.id);
    }

    #[tokio::test]
    async fn new_login_invalidates_previous_refresh_token() {
        let (_, manager, _) = registered().await;

        let first = manager.login(abby_login()).await.unwrap();
        let _second = manager.login(abby_login()).await.unwrap();

        assert_matches!(
            manager.refresh(None, Some(&first.tokens.refresh_token)).await,
            Err(AppError::Auth(AuthError::TokenReused))
        );
    }

    #[tokio::test]
    async fn refresh_rotates_and_is_single_use() {
        let (store, manager, user) = registered().await;
        let login = manager.login(abby_login()).await.unwrap();

        let rotated = manager.refresh(None, Some(&login.tokens.refresh_token)).await.unwrap();

        assert_ne!(rotated.refresh_token, login.tokens.refresh_token);
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(rotated.refresh_token.as_str()));

        assert_matches!(
            manager.refresh(None, Some(&login.tokens.refresh_token)).await,
            Err(AppError::Auth(AuthError::TokenReused))
        );
        assert!(manager.refresh(None, Some(&rotated.refresh_token)).await.is_ok());
    }

    /// Yields after every lookup, so two refreshes interleave between the
    /// read of the record and the rotation.
    struct InterleavingStore {
        inner: Arc<InMemoryCredentialStore>,
    }

    #[async_trait]
    impl CredentialStore for InterleavingStore {
        async fn find_by_identifier(
            &self,
            username: Option<&str>,
            email: Option<&str>,
        ) -> Result<Option<UserRecord>, AppError> {
            self.inner.find_by_identifier(username, email).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
            let user = self.inner.find_by_id(id).await;
            tokio::task::yield_now().await;
            user
        }

        async fn create(&self, user: NewUser) -> Result<UserRecord, AppError> {
            self.inner.create(user).await
        }

        async fn update_refresh_token(
            &self,
            id: Uuid,
            token: Option<&str>,
        ) -> Result<UserRecord, AppError> {
            self.inner.update_refresh_token(id, token).await
        }

        async fn rotate_refresh_token(
            &self,
            id: Uuid,
            current: &str,
            replacement: &str,
        ) -> Result<Option<UserRecord>, AppError> {
            self.inner.rotate_refresh_token(id, current, replacement).await
        }

        async fn update_password_hash(
            &self,
            id: Uuid,
            digest: &PasswordDigest,
        ) -> Result<UserRecord, AppError> {
            self.inner.update_password_hash(id, digest).await
        }

        async fn update_account_details(
            &self,
            id: Uuid,
            fullname: &str,
            email: &str,
        ) -> Result<UserRecord, AppError> {
            self.inner.update_account_details(id, fullname, email).await
        }

        async fn update_image(
            &self,
            id: Uuid,
            kind: ImageKind,
            url: &str,
        ) -> Result<UserRecord, AppError> {
            self.inner.update_image(id, kind, url).await
        }
    }

    #[tokio::test]
    async fn concurrent_refresh_with_same_token_succeeds_once() {
        let inner = Arc::new(InMemoryCredentialStore::new());
        let manager = SessionManager::new(
            Arc::new(InterleavingStore { inner: inner.clone() }),
            Arc::new(StubBlobStore { fail: false }),
            PasswordHasher::new(4).unwrap(),
            TokenIssuer::new(&jwt_settings()),
        );
        let user = manager.register(abby()).await.unwrap();
        let login = manager.login(abby_login()).await.unwrap();
        let token = login.tokens.refresh_token.as_str();

        let (a, b) = tokio::join!(
            manager.refresh(None, Some(token)),
            manager.refresh(None, Some(token))
        );

        let (winner, loser) = match (a, b) {
            (Ok(pair), Err(e)) | (Err(e), Ok(pair)) => (pair, e),
            (a, b) => panic!("expected exactly one success, got {:?} and {:?}", a.is_ok(), b.is_ok()),
        };
        assert_matches!(loser, AppError::Auth(AuthError::TokenReused));
        let stored = inner.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(winner.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn refresh_prefers_cookie_over_body() {
        let (_, manager, _) = registered().await;
        let login = manager.login(abby_login()).await.unwrap();

        let result = manager
            .refresh(Some(&login.tokens.refresh_token), Some("garbage"))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn refresh_without_token_is_unauthorized() {
        let (_, manager, _) = registered().await;

        assert_matches!(
            manager.refresh(None, None).await,
            Err(AppError::Auth(AuthError::MissingToken))
        );
        assert_matches!(
            manager.refresh(Some(""), Some("")).await,
            Err(AppError::Auth(AuthError::MissingToken))
        );
    }

    #[tokio::test]
    async fn refresh_surfaces_verification_failure() {
        let (_, manager, _) = registered().await;
        let login = manager.login(abby_login()).await.unwrap();

        // An access token is signed with the other key.
        match manager.refresh(None, Some(&login.tokens.access_token)).await {
            Err(AppError::Auth(AuthError::InvalidToken(msg))) => {
                assert_eq!(msg, "invalid signature")
            }
            other => panic!("Expected InvalidToken, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn refresh_for_unknown_user_is_unauthorized() {
        let (_, manager, _) = registered().await;
        let orphan = manager.token_issuer().issue_refresh_token(Uuid::new_v4()).unwrap();

        assert_matches!(
            manager.refresh(None, Some(&orphan)).await,
            Err(AppError::Auth(AuthError::UnknownSubject))
        );
    }

    #[tokio::test]
    async fn logout_clears_slot_and_blocks_refresh() {
        let (store, manager, user) = registered().await;
        let login = manager.login(abby_login()).await.unwrap();

        manager.logout(user.id).await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
        assert_matches!(
            manager.refresh(None, Some(&login.tokens.refresh_token)).await,
            Err(AppError::Auth(AuthError::TokenReused))
        );
    }

    #[tokio::test]
    async fn logout_without_session_is_ok() {
        let (_, manager, user) = registered().await;

        assert!(manager.logout(user.id).await.is_ok());
        assert!(manager.logout(user.id).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_requires_old_password() {
        let (_, manager, user) = registered().await;

        assert_matches!(
            manager.change_password(user.id, Some("wrong"), Some("p2")).await,
            Err(AppError::Auth(AuthError::WrongPassword))
        );
    }

    #[tokio::test]
    async fn change_password_rehashes_and_keeps_session() {
        let (store, manager, user) = registered().await;
        let login = manager.login(abby_login()).await.unwrap();
        let old_hash = store.find_by_id(user.id).await.unwrap().unwrap().password_hash;

        manager.change_password(user.id, Some("p1"), Some("p2")).await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, old_hash);
        assert_eq!(stored.refresh_token.as_deref(), Some(login.tokens.refresh_token.as_str()));

        assert!(manager.login(abby_login()).await.is_err());
        let credentials = LoginCredentials {
            password: Some("p2".to_string()),
            ..abby_login()
        };
        assert!(manager.login(credentials).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_rejects_blank_new_password() {
        let (_, manager, user) = registered().await;

        assert_matches!(
            manager.change_password(user.id, Some("p1"), Some("  ")).await,
            Err(AppError::Validation(_))
        );
    }
}
