use super::resolver::{ResolverError, ServiceInstance};
use super::storage::StorageError;
use crate::domain::transform::TransformRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid transformer route: {0}")]
    InvalidRoute(String),
    #[error("no instance of transformer {0} available")]
    NoInstance(String),
    #[error("transformer {name} unreachable: {reason}")]
    Unreachable { name: String, reason: String },
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("downstream hop failed: {0}")]
    Downstream(tonic::Status),
    #[error("transformation failed: {0}")]
    Transform(String),
    #[error("relay io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transformed bytes, at most one chunk per item. An error is always the last item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChainError>> + Send>>;

/// Calls the next hop of a chain.
#[async_trait]
pub trait HopClient: Send + Sync {
    async fn transform(
        &self,
        instance: &ServiceInstance,
        request: TransformRequest,
    ) -> Result<ChunkStream, ChainError>;
}
