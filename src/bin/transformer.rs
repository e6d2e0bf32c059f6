//! Transformer Binary
//!
//! Serves one effect of the transformation chain over gRPC and registers
//! itself with the service resolver under the effect name.
//!
//! Environment Variables:
//! - TRANSFORMER: effect served by this hop (flip, gray)
//! - ADDR, PORT: gRPC bind address
//! - ADVERTISE_ADDR: address registered with the resolver
//! - RESOLVER (consul|static), CONSUL_URL, CONSUL_USER, CONSUL_PWD, STATIC_SERVICES
//! - STORAGE (local|s3), UPLOAD_DIR, S3_BUCKET, S3_ENDPOINT: segment storage
//! - FFMPEG_PATH: ffmpeg binary running the effect
//! - HEALTH_ADDR: health endpoint bind address

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use vidcast::adapters::grpc::{client::GrpcHopClient, server::serve};
use vidcast::adapters::http::serve_health;
use vidcast::adapters::{resolver_from_config, storage_from_config};
use vidcast::application::chain::TransformChain;
use vidcast::config::TransformerConfig;
use vidcast::domain::av::{Effect, EffectCommand};
use vidcast::ports::resolver::{ServiceInstance, TRANSFORMER_TAG};

#[tokio::main]
async fn main() {
    let config = TransformerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let effect: Effect = match config.effect.parse() {
        Ok(effect) => effect,
        Err(e) => {
            tracing::error!(error = %e, "invalid TRANSFORMER");
            std::process::exit(1);
        }
    };

    // 1. Adapters
    let storage = match storage_from_config(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!(error = %e, "failed to open object storage");
            std::process::exit(1);
        }
    };
    let resolver = match resolver_from_config(&config.resolver) {
        Ok(resolver) => resolver,
        Err(e) => {
            tracing::error!(error = %e, "failed to build service resolver");
            std::process::exit(1);
        }
    };

    // 2. Application service
    let chain = Arc::new(TransformChain::new(
        storage,
        resolver.clone(),
        Arc::new(GrpcHopClient::default()),
        Arc::new(EffectCommand::new(effect, config.ffmpeg.clone())),
    ));

    // 3. Listeners
    let grpc = match TcpListener::bind((config.addr.as_str(), config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                error = %e,
                addr = %config.addr,
                port = config.port,
                "failed to bind gRPC listener"
            );
            std::process::exit(1);
        }
    };
    let port = grpc.local_addr().map(|addr| addr.port()).unwrap_or(config.port);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    match TcpListener::bind(&config.health_addr).await {
        Ok(listener) => {
            let mut rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let shutdown = async move {
                    let _ = rx.changed().await;
                };
                if let Err(e) = serve_health(effect.as_str(), listener, shutdown).await {
                    tracing::error!(error = %e, "health endpoint stopped");
                }
            });
        }
        Err(e) => tracing::warn!(
            error = %e,
            addr = %config.health_addr,
            "health endpoint disabled"
        ),
    }

    // 4. Registration
    let instance = ServiceInstance::new(effect.as_str(), config.advertise_addr.clone(), port);
    match resolver.register(&instance, &[TRANSFORMER_TAG.to_string()]).await {
        Ok(()) => tracing::info!(
            name = %instance.name,
            endpoint = %instance.endpoint(),
            "registered"
        ),
        Err(e) => tracing::warn!(
            error = %e,
            "service registration failed, hop is only reachable directly"
        ),
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down transformer");
        }
        let _ = shutdown_tx.send(true);
    });

    let shutdown = async move {
        let _ = shutdown_rx.changed().await;
    };
    if let Err(e) = serve(chain, grpc, shutdown).await {
        tracing::error!(error = %e, "gRPC server failed");
        std::process::exit(1);
    }
}
