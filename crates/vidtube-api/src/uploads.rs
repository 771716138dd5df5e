use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::Multipart;
use tokio::fs;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub struct UploadedFile {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// A fully read multipart body: text fields and files, keyed by field name.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e.body_text())))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Failed to read file '{}': {}", name, e.body_text())))?;
                // Browsers send an empty part when no file was picked.
                if bytes.is_empty() {
                    continue;
                }
                form.files
                    .entry(name)
                    .or_default()
                    .push(UploadedFile { file_name, bytes });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Failed to read field '{}': {}", name, e.body_text())))?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// At most one file may be sent under `name`.
    pub fn take_single_file(&mut self, name: &str) -> Result<Option<UploadedFile>, ApiError> {
        let Some(mut files) = self.files.remove(name) else {
            return Ok(None);
        };
        if files.len() > 1 {
            return Err(ApiError::Validation(format!("Only one '{}' file is allowed", name)));
        }
        Ok(files.pop())
    }
}

/// Stages `file` on disk, hands it to the media host and returns the hosted
/// URL. The staged copy is removed whether or not the upload worked.
pub async fn upload_to_media(state: &AppState, file: &UploadedFile, what: &str) -> Result<String, ApiError> {
    let staged = stage(&state.upload_dir, file).await?;

    let result = tokio::time::timeout(state.collaborator_timeout, state.media.upload(&staged)).await;
    remove_staged(&staged).await;

    match result {
        Ok(Ok(url)) => Ok(url),
        Ok(Err(e)) => {
            error!("Media upload of {} failed: {}", what, e);
            Err(ApiError::Validation(format!("Error while uploading {}", what)))
        }
        Err(_) => {
            error!("Media upload of {} exceeded {:?}", what, state.collaborator_timeout);
            Err(ApiError::Validation(format!("Error while uploading {}", what)))
        }
    }
}

async fn stage(dir: &Path, file: &UploadedFile) -> Result<PathBuf, ApiError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::internal("Failed to create upload directory", e))?;

    let name = match file.file_name.as_deref().and_then(safe_extension) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    };
    let path = dir.join(name);
    fs::write(&path, &file.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to stage upload", e))?;
    Ok(path)
}

async fn remove_staged(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staged file {}: {}", path.display(), e),
    }
}

/// Extension of a client-supplied file name, if it is short and plain.
/// Anything else is dropped so client input never shapes the staged path.
fn safe_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
