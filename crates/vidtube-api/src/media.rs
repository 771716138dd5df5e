//! Media hosting: turns a staged local file into a durable public URL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to read staged file: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("media host rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("media host response had no url")]
    MissingUrl,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Uploads the file at `path` and returns the URL it is served from.
    async fn upload(&self, path: &Path) -> Result<String, MediaError>;
}

// -- Cloudinary --

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

pub struct CloudinaryHost {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct CloudinaryUpload {
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/auto/upload",
            self.config.cloud_name
        )
    }
}

/// Signature over the signed parameters (sorted, `&`-joined) followed by
/// the API secret.
fn cloudinary_signature(timestamp: i64, api_secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("timestamp={}{}", timestamp, api_secret).as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaHost for CloudinaryHost {
    async fn upload(&self, path: &Path) -> Result<String, MediaError> {
        let bytes = fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = Utc::now().timestamp();
        let form = reqwest::multipart::Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", cloudinary_signature(timestamp, &self.config.api_secret))
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let resp = self.http.post(self.endpoint()).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Cloudinary upload failed with {}: {}", status, body);
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let uploaded: CloudinaryUpload = resp.json().await?;
        let url = uploaded.secure_url.or(uploaded.url).ok_or(MediaError::MissingUrl)?;
        info!("Uploaded {} to Cloudinary", path.display());
        Ok(url)
    }
}

// -- Local disk --

/// Keeps media on local disk under `dir`, served at `{public_url}/media/`.
pub struct LocalMediaHost {
    dir: PathBuf,
    public_url: String,
}

impl LocalMediaHost {
    pub async fn new(dir: PathBuf, public_url: &str) -> Result<Self, MediaError> {
        fs::create_dir_all(&dir).await?;
        info!("Local media directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MediaHost for LocalMediaHost {
    async fn upload(&self, path: &Path) -> Result<String, MediaError> {
        let name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        fs::copy(path, self.dir.join(&name)).await?;
        Ok(format!("{}/media/{}", self.public_url, name))
    }
}
