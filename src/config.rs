//! Process configuration, read once at start-up.

use std::fmt;

use anyhow::{bail, Context, Result};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5001;
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_REGION: &str = "auto";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageConfig,
    pub ffmpeg: FfmpegConfig,
}

/// Connection details for the S3-compatible clip bucket.
#[derive(Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// S3 API endpoint, e.g. `https://storage.googleapis.com` with HMAC keys,
    /// or `http://127.0.0.1:9000` for MinIO.
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub binary: String,
    pub video_codec: String,
    pub audio_codec: String,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            optional(key).with_context(|| format!("{key} must be set to a non-empty value"))
        };

        let port = match optional("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port number: {raw}"))?,
            None => DEFAULT_PORT,
        };

        let endpoint = optional("STORAGE_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.into());
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("STORAGE_ENDPOINT must be an http(s) URL: {endpoint}");
        }

        Ok(Config {
            host: optional("HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port,
            storage: StorageConfig {
                bucket: required("STORAGE_BUCKET")?,
                endpoint,
                region: optional("STORAGE_REGION").unwrap_or_else(|| DEFAULT_REGION.into()),
                access_key_id: required("STORAGE_ACCESS_KEY_ID")?,
                secret_access_key: required("STORAGE_SECRET_ACCESS_KEY")?,
            },
            ffmpeg: FfmpegConfig {
                binary: optional("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".into()),
                video_codec: optional("VIDEO_CODEC").unwrap_or_else(|| "libx264".into()),
                audio_codec: optional("AUDIO_CODEC").unwrap_or_else(|| "aac".into()),
            },
        })
    }
}
