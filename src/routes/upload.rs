//! Multipart form spooling
//!
//! Text fields are collected in memory; file fields are written to the
//! upload directory so the blob store can pick them up by path. Spooled
//! files are removed when the form is dropped if nothing consumed them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use actix_multipart::Multipart;
use futures::TryStreamExt;
use uuid::Uuid;

use crate::configuration::ApplicationSettings;
use crate::error::{AppError, ValidationError};

/// Upper bound on parts per form; the largest form (registration) has six.
const MAX_FORM_PARTS: usize = 8;

#[derive(Debug)]
struct SpooledFile {
    path: PathBuf,
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        // Usually already removed by the blob store.
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, SpooledFile>,
}

fn malformed(e: impl std::fmt::Display) -> AppError {
    ValidationError::MalformedRequest(e.to_string()).into()
}

/// Keep only the final path component and a conservative character set
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

impl MultipartForm {
    pub async fn read(mut payload: Multipart, settings: &ApplicationSettings) -> Result<Self, AppError> {
        let upload_dir = PathBuf::from(&settings.upload_dir);
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;

        let mut form = MultipartForm::default();
        let mut parts = 0;
        while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
            parts += 1;
            if parts > MAX_FORM_PARTS {
                return Err(malformed(format!("form has more than {} parts", MAX_FORM_PARTS)));
            }
            let disposition = field.content_disposition().clone();
            let name = disposition.get_name().unwrap_or_default().to_string();

            let mut data = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(malformed)? {
                if data.len() + chunk.len() > settings.max_upload_bytes {
                    return Err(malformed(format!(
                        "{} exceeds {} bytes",
                        name, settings.max_upload_bytes
                    )));
                }
                data.extend_from_slice(&chunk);
            }

            match disposition.get_filename() {
                Some(filename) => {
                    if data.is_empty() {
                        continue;
                    }
                    let path = upload_dir.join(format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename)));
                    tokio::fs::write(&path, &data)
                        .await
                        .map_err(|e| AppError::Internal(format!("Failed to spool upload: {}", e)))?;
                    form.files.insert(name, SpooledFile { path });
                }
                None => {
                    let value = String::from_utf8(data).map_err(malformed)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    /// Local path of the spooled file uploaded under `name`
    pub fn file_path(&self, name: &str) -> Option<PathBuf> {
        self.files.get(name).map(|f| f.path.clone())
    }
}
