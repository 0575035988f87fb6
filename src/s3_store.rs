use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use log::{debug, info};
use tokio::fs;

use crate::config::StorageConfig;
use crate::storage::ClipStore;

/// `ClipStore` backed by an S3-compatible endpoint (GCS interoperability,
/// MinIO, AWS).
pub struct S3ClipStore {
    client: Client,
    bucket: String,
    endpoint: String,
}

impl S3ClipStore {
    /// Creates a new S3ClipStore.
    ///
    /// * `config` - bucket, endpoint, region and HMAC credentials. Path-style
    ///   addressing is forced so that the endpoint can be a plain host such as
    ///   `https://storage.googleapis.com` or `http://127.0.0.1:9000`.
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "highlight-stitcher",
        );

        let sdk_config = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        S3ClipStore {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClipStore for S3ClipStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .with_context(|| format!("failed to list objects under {prefix}"))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects under {}", keys.len(), prefix);
        Ok(keys)
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch {key}"))?;

        let mut body = resp.body.into_async_read();
        let mut file = fs::File::create(local_path)
            .await
            .with_context(|| format!("failed to create {}", local_path.display()))?;
        tokio::io::copy(&mut body, &mut file)
            .await
            .with_context(|| format!("failed to write {key} to {}", local_path.display()))?;

        info!("Downloaded {} to {}", key, local_path.display());
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("failed to read {}", local_path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("video/mp4")
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to upload {key}"))?;

        info!("Uploaded {} to {}", local_path.display(), key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete {key}"))?;

        info!("Deleted {}", key);
        Ok(())
    }
}
