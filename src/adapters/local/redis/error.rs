//! Redis error types for the local adapter.

use crate::ports::channel::ChannelError;
use deadpool_redis::CreatePoolError;
use thiserror::Error;

pub type RedisError = deadpool_redis::redis::RedisError;
pub type PoolError = deadpool_redis::PoolError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Create pool error: {0}")]
    CreatePool(#[from] CreatePoolError),
}

impl From<QueueError> for ChannelError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Redis(e) if e.is_connection_dropped() || e.is_io_error() => {
                ChannelError::Connection(e.to_string())
            }
            QueueError::Redis(e) => ChannelError::Command(e.to_string()),
            QueueError::Pool(e) => ChannelError::Connection(e.to_string()),
            QueueError::CreatePool(e) => ChannelError::Connection(e.to_string()),
        }
    }
}
