mod api;
mod clip;
mod concat;
mod config;
mod error;
mod lock;
mod pipeline;
mod s3_store;
mod storage;

use std::sync::Arc;

use actix_web::web;
use anyhow::Result;
use env_logger::Env;
use log::info;

use crate::concat::FfmpegConcatenator;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::s3_store::S3ClipStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);

    let store = S3ClipStore::new(&config.storage);
    info!(
        "Using bucket {} at {}",
        store.bucket(),
        store.endpoint()
    );
    let concatenator = FfmpegConcatenator::new(&config.ffmpeg);

    // Built once, shared by every worker for the life of the process.
    let pipeline = web::Data::new(Pipeline::new(Arc::new(store), Arc::new(concatenator)));

    api::run_api_server(&config, pipeline).await?;
    Ok(())
}
