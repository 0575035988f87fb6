use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::clip::VIDEO_EXTENSION;

/// Object storage as seen by the pipeline.
#[async_trait]
pub trait ClipStore: Send + Sync {
    /// Every object key under `prefix`, nested keys included.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Writes the object at `key` to `local_path`.
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Stores the file at `local_path` under `key`.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

pub fn is_video_key(key: &str) -> bool {
    key.ends_with(VIDEO_EXTENSION)
}
