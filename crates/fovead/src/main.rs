use anyhow::Result;
use fovea_core::{negotiate, ModelBlob, OrtEngine};
use fovea_hw::{Camera, ResizeBuffer};
use tracing_subscriber::EnvFilter;

mod config;
mod egress;
mod pipeline;

use config::Config;
use egress::ChannelEgress;
use pipeline::{spawn_pipeline, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("fovead starting");
    let config = Config::from_env();

    // Startup phase. Every failure here aborts before the timer is armed;
    // no ticks ever occur against a half-initialized pipeline.
    let blob = ModelBlob::load(&config.model_path)?;
    let engine = OrtEngine::new(blob)?;
    let layout = negotiate(&engine)?;

    let buffer = ResizeBuffer::new(layout.geometry)?;
    let camera = Camera::open(
        config.camera_index,
        config.capture_width,
        config.capture_height,
    )?;

    let (egress, mut rx) = ChannelEgress::new(config.egress_queue);
    let pipeline = Pipeline::new(camera, egress, buffer, config.failure_policy());
    let mut handle = spawn_pipeline(pipeline, config.tick_period())?;

    // The engine and its prepared input binding stay resident for the
    // inference stage; the capture pipeline shares only the geometry.
    let inference = (engine, layout.binding);

    // Drain published records until shutdown. The real consumer attaches
    // here; for now each record is acknowledged in the log.
    let consumer = tokio::spawn(async move {
        let mut published: u64 = 0;
        while let Some(record) = rx.recv().await {
            published += 1;
            tracing::debug!(
                width = record.width,
                height = record.height,
                encoding = record.encoding,
                published,
                "frame egressed"
            );
        }
        published
    });

    tracing::info!("fovead ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("fovead shutting down");

    handle.stop();
    drop(inference);
    let published = consumer.await.unwrap_or(0);
    tracing::info!(published, "fovead stopped");

    Ok(())
}
