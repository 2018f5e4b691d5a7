//! Media host client
//!
//! Uploads locally spooled files to a Cloudinary-style media host and
//! returns the public URL. The spooled file is removed after every attempt.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::configuration::BlobStoreSettings;

/// A file stored on the media host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub url: String,
    pub id: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `local_path`. `None` means the upload failed.
    async fn upload(&self, local_path: &Path) -> Option<UploadedAsset>;
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    public_id: String,
}

#[derive(Clone)]
pub struct HttpBlobStore {
    http_client: reqwest::Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl HttpBlobStore {
    pub fn new(settings: &BlobStoreSettings, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            cloud_name: settings.cloud_name.clone(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/auto/upload", self.base_url, self.cloud_name)
    }

    /// SHA-256 over the signed parameters followed by the API secret
    fn sign(&self, timestamp: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("timestamp={}{}", timestamp, self.api_secret).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    async fn try_upload(&self, local_path: &Path) -> Result<UploadedAsset, String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| format!("Failed to read upload: {}", e))?;
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = chrono::Utc::now().timestamp();
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", self.sign(timestamp));

        let response: UploadResponse = self
            .http_client
            .post(&self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("Failed to reach media host: {}", e))?
            .error_for_status()
            .map_err(|e| format!("Media host returned error: {}", e))?
            .json()
            .await
            .map_err(|e| format!("Unreadable media host response: {}", e))?;

        let url = response
            .secure_url
            .or(response.url)
            .ok_or_else(|| "Media host response has no url".to_string())?;

        Ok(UploadedAsset {
            url,
            id: response.public_id,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, local_path: &Path) -> Option<UploadedAsset> {
        let result = self.try_upload(local_path).await;

        if let Err(e) = tokio::fs::remove_file(local_path).await {
            tracing::warn!(path = %local_path.display(), "Failed to remove spooled upload: {}", e);
        }

        match result {
            Ok(asset) => {
                tracing::info!(asset_id = %asset.id, "File uploaded to media host");
                Some(asset)
            }
            Err(e) => {
                tracing::error!(path = %local_path.display(), "Upload failed: {}", e);
                None
            }
        }
    }
}
