//! Download, concatenate, upload and clean up the clips of one folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;
use tokio::fs;

use crate::clip::{ClipFolder, ConcatJob};
use crate::concat::Concatenator;
use crate::lock::KeyedLocks;
use crate::storage::{is_video_key, ClipStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no clips found under {prefix}")]
    NoClips { prefix: String },

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("concatenation failed: {0:#}")]
    Concat(anyhow::Error),

    #[error("local filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatOutcome {
    pub output_path: PathBuf,
    pub folder_path: String,
    pub clip_count: usize,
}

pub struct Pipeline {
    store: Arc<dyn ClipStore>,
    concatenator: Arc<dyn Concatenator>,
    locks: KeyedLocks,
}

/// Concatenation order: an earlier result first, then clips by key.
fn order_clips(mut keys: Vec<String>, folder: &ClipFolder) -> Vec<String> {
    let output_key = folder.output_key();
    keys.sort_by(|a, b| {
        (a != &output_key)
            .cmp(&(b != &output_key))
            .then_with(|| a.cmp(b))
    });
    keys
}

fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

impl Pipeline {
    pub fn new(store: Arc<dyn ClipStore>, concatenator: Arc<dyn Concatenator>) -> Self {
        Pipeline {
            store,
            concatenator,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn run(&self, job: &ConcatJob) -> Result<ConcatOutcome, PipelineError> {
        let prefix = job.folder.prefix();

        // Always prefix, then local dir, then output path, so two runs cannot
        // deadlock. Runs sharing a local dir overwrite each other's downloads.
        let _prefix_guard = self.locks.acquire(&format!("prefix:{prefix}")).await;
        let _local_guard = self
            .locks
            .acquire(&format!("local:{}", job.local_dir.display()))
            .await;
        let _output_guard = self
            .locks
            .acquire(&format!("output:{}", job.output_path.display()))
            .await;

        let clips = self.download_clips(&job.folder, &job.local_dir).await?;
        if clips.is_empty() {
            return Err(PipelineError::NoClips { prefix });
        }

        self.concatenator
            .concatenate(&clips, &job.output_path)
            .await
            .map_err(PipelineError::Concat)?;

        self.store
            .upload(&job.output_path, &job.folder.output_key())
            .await
            .map_err(PipelineError::Storage)?;

        self.delete_other_clips(&job.folder).await?;

        info!(
            "Concatenated {} clips under {} into {}",
            clips.len(),
            prefix,
            job.output_path.display()
        );

        Ok(ConcatOutcome {
            output_path: job.output_path.clone(),
            folder_path: prefix,
            clip_count: clips.len(),
        })
    }

    /// Downloads every `.mp4` under the folder into `local_dir`, keeping only
    /// the base file name. Returns the local paths in concatenation order.
    pub async fn download_clips(
        &self,
        folder: &ClipFolder,
        local_dir: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let keys = self
            .store
            .list(&folder.prefix())
            .await
            .map_err(PipelineError::Storage)?;
        let keys = order_clips(keys.into_iter().filter(|k| is_video_key(k)).collect(), folder);
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        fs::create_dir_all(local_dir).await?;

        let mut clip_paths = Vec::with_capacity(keys.len());
        for key in &keys {
            let local_path = local_dir.join(base_name(key));
            self.store
                .download(key, &local_path)
                .await
                .map_err(PipelineError::Storage)?;
            if clip_paths.contains(&local_path) {
                warn!(
                    "{} shares its file name with an earlier clip and replaced {}",
                    key,
                    local_path.display()
                );
                continue;
            }
            clip_paths.push(local_path);
        }

        Ok(clip_paths)
    }

    /// Deletes every `.mp4` under the folder except the concatenated result.
    pub async fn delete_other_clips(&self, folder: &ClipFolder) -> Result<usize, PipelineError> {
        let output_key = folder.output_key();
        let keys = self
            .store
            .list(&folder.prefix())
            .await
            .map_err(PipelineError::Storage)?;

        let mut deleted = 0;
        for key in keys.iter().filter(|k| is_video_key(k) && **k != output_key) {
            self.store
                .delete(key)
                .await
                .map_err(PipelineError::Storage)?;
            deleted += 1;
        }
        Ok(deleted)
    }
}
