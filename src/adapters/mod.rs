//! Adapters - Concrete implementations of ports.

#[cfg(feature = "aws")]
pub mod aws;
pub mod consul;
pub mod ffmpeg;
pub mod grpc;
pub mod http;
pub mod local;

use crate::config::{ResolverConfig, StorageConfig};
use crate::ports::resolver::{ResolverError, ServiceResolver};
use crate::ports::storage::{ObjectStore, StorageError};
use std::sync::Arc;

/// Build the object store selected by `config`.
pub async fn storage_from_config(
    config: &StorageConfig,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config {
        StorageConfig::Local { root } => {
            tokio::fs::create_dir_all(root).await?;
            Ok(Arc::new(local::FsAdapter::new(root.clone())))
        }
        #[cfg(feature = "aws")]
        StorageConfig::S3 { bucket, endpoint } => {
            let s3 = aws::S3Adapter::from_env(bucket.clone(), endpoint.clone()).await;
            s3.ensure_bucket().await?;
            Ok(Arc::new(s3))
        }
        #[cfg(not(feature = "aws"))]
        StorageConfig::S3 { .. } => Err(StorageError::Backend(
            "S3 storage requires the `aws` feature".to_string(),
        )),
    }
}

pub fn resolver_from_config(
    config: &ResolverConfig,
) -> Result<Arc<dyn ServiceResolver>, ResolverError> {
    match config {
        ResolverConfig::Consul { url, credentials } => Ok(Arc::new(consul::ConsulResolver::new(
            url.clone(),
            credentials.clone(),
        ))),
        ResolverConfig::Static { table } => Ok(Arc::new(local::StaticResolver::parse(table)?)),
    }
}
