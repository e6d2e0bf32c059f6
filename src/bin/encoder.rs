//! Encoder Binary
//!
//! Consumes `VideoUploaded` from the Redis channel, transcodes each source into
//! an HLS rendition ladder, uploads the result and reports on `VideoEncoded`.
//!
//! Environment Variables:
//! - REDIS_URL, CHANNEL_NAMESPACE, CHANNEL_CONSUMER: message channel
//! - STORAGE (local|s3), UPLOAD_DIR, S3_BUCKET, S3_ENDPOINT: object storage
//! - ENCODER_WORKDIR, ENCODE_TIMEOUT_SECS, FFMPEG_PATH, FFPROBE_PATH
//! - HEALTH_ADDR: health endpoint bind address

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use vidcast::adapters::ffmpeg::Ffmpeg;
use vidcast::adapters::http::serve_health;
use vidcast::adapters::local::RedisChannel;
use vidcast::adapters::storage_from_config;
use vidcast::application::encoder::{EncodeSettings, EncodeWorker};
use vidcast::config::EncoderConfig;

#[tokio::main]
async fn main() {
    let config = EncoderConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Adapters
    let channel = match RedisChannel::connect(config.channel.clone()).await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!(
                error = %e,
                url = %config.channel.redis_url,
                "failed to connect to Redis"
            );
            std::process::exit(1);
        }
    };

    let storage = match storage_from_config(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!(error = %e, "failed to open object storage");
            std::process::exit(1);
        }
    };

    let tools = Ffmpeg::new(config.ffmpeg.clone(), config.ffprobe.clone());

    // 2. Application service
    let mut settings = EncodeSettings::new(config.workdir.clone());
    settings.timeout = config.encode_timeout;
    let worker = EncodeWorker::new(storage, channel, tools, settings);

    // 3. Health endpoint
    let health = match TcpListener::bind(&config.health_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                error = %e,
                addr = %config.health_addr,
                "failed to bind health endpoint"
            );
            std::process::exit(1);
        }
    };
    tokio::spawn(async move {
        if let Err(e) = serve_health("encoder", health, std::future::pending()).await {
            tracing::error!(error = %e, "health endpoint stopped");
        }
    });

    // 4. Run until interrupted
    tokio::select! {
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down encoder");
        }
    }

    // Only removes the work directory when nothing else lives in it.
    if let Err(e) = tokio::fs::remove_dir(&config.workdir).await {
        tracing::debug!(error = %e, "work directory left in place");
    }
}
