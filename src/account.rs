//! Account details for an authenticated user

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::blob_store::BlobStore;
use crate::error::{AppError, ValidationError};
use crate::store::{CredentialStore, ImageKind, PublicUser, USER_NOT_FOUND};
use crate::validators::{is_valid_email, is_valid_name, required};

pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    blob_store: Arc<dyn BlobStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>, blob_store: Arc<dyn BlobStore>) -> Self {
        Self { store, blob_store }
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .map(PublicUser::from)
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
    }

    /// Both fields are required. Email is normalized and must stay unique.
    pub async fn update_account(
        &self,
        user_id: Uuid,
        fullname: Option<&str>,
        email: Option<&str>,
    ) -> Result<PublicUser, AppError> {
        let fullname = is_valid_name(&required("fullname", fullname)?)?;
        let email = is_valid_email(&required("email", email)?)?;

        let user = self
            .store
            .update_account_details(user_id, &fullname, &email)
            .await?;

        tracing::info!(user_id = %user_id, "Account details updated");
        Ok(user.into())
    }

    /// Upload a new avatar or cover image and store its URL
    pub async fn update_image(
        &self,
        user_id: Uuid,
        kind: ImageKind,
        local_path: Option<PathBuf>,
    ) -> Result<PublicUser, AppError> {
        let field = kind.field_name().to_string();
        let local_path = local_path.ok_or_else(|| ValidationError::MissingFile(field.clone()))?;
        let asset = self
            .blob_store
            .upload(&local_path)
            .await
            .ok_or(ValidationError::UploadFailed(field))?;

        let user = self.store.update_image(user_id, kind, &asset.url).await?;

        tracing::info!(user_id = %user_id, kind = ?kind, "Image updated");
        Ok(user.into())
    }
}
