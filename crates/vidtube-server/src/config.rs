use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use vidtube_api::media::CloudinaryConfig;
use vidtube_api::tokens::{TokenConfig, parse_expiry};

/// Token secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub tokens: TokenConfig,
    /// `None` means permissive CORS.
    pub cors_origin: Option<String>,
    pub upload_tmp_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub collaborator_timeout: Duration,
    /// Set only when all three Cloudinary variables are present.
    pub cloudinary: Option<CloudinaryConfig>,
    pub media_dir: PathBuf,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let access_secret = secret(var("ACCESS_TOKEN_SECRET"), "ACCESS_TOKEN_SECRET")?;
        let refresh_secret = secret(var("REFRESH_TOKEN_SECRET"), "REFRESH_TOKEN_SECRET")?;
        if access_secret == refresh_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }
        let access_ttl = parse_expiry(&or("ACCESS_TOKEN_EXPIRY", "1d"))
            .context("invalid ACCESS_TOKEN_EXPIRY")?;
        let refresh_ttl = parse_expiry(&or("REFRESH_TOKEN_EXPIRY", "10d"))
            .context("invalid REFRESH_TOKEN_EXPIRY")?;

        let port = or("VIDTUBE_PORT", "8000")
            .parse()
            .context("invalid VIDTUBE_PORT")?;
        let max_upload_bytes = match var("VIDTUBE_MAX_UPLOAD_BYTES") {
            Some(v) => v.parse().context("invalid VIDTUBE_MAX_UPLOAD_BYTES")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let timeout_secs: u64 = or("VIDTUBE_COLLABORATOR_TIMEOUT_SECS", "15")
            .parse()
            .context("invalid VIDTUBE_COLLABORATOR_TIMEOUT_SECS")?;
        if timeout_secs == 0 {
            bail!("VIDTUBE_COLLABORATOR_TIMEOUT_SECS must be positive");
        }

        let cloudinary = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Ok(Self {
            host: or("VIDTUBE_HOST", "0.0.0.0"),
            port,
            db_path: or("VIDTUBE_DB_PATH", "vidtube.db").into(),
            tokens: TokenConfig {
                access_secret,
                access_ttl,
                refresh_secret,
                refresh_ttl,
            },
            cors_origin: var("CORS_ORIGIN").filter(|o| o != "*"),
            upload_tmp_dir: or("VIDTUBE_UPLOAD_TMP_DIR", "./public/temp").into(),
            max_upload_bytes,
            collaborator_timeout: Duration::from_secs(timeout_secs),
            cloudinary,
            media_dir: or("VIDTUBE_MEDIA_DIR", "./public/media").into(),
            public_url: or("VIDTUBE_PUBLIC_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

fn secret(value: Option<String>, name: &str) -> anyhow::Result<String> {
    match value {
        None => bail!("{name} is not set"),
        Some(v) if PLACEHOLDER_SECRETS.contains(&v.as_str()) => {
            bail!("{name} is still a placeholder value")
        }
        Some(v) => Ok(v),
    }
}
