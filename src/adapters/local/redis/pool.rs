//! Redis connection pool.

use super::error::QueueError;
use deadpool_redis::{Config, Pool, Runtime};

/// Build a pool and check out one connection, so a bad address fails here.
pub(super) async fn connect(redis_url: &str) -> Result<Pool, QueueError> {
    let pool = create_pool(redis_url)?;
    drop(pool.get().await?);
    Ok(pool)
}

pub(super) fn create_pool(redis_url: &str) -> Result<Pool, QueueError> {
    let cfg = Config::from_url(redis_url);
    Ok(cfg.create_pool(Some(Runtime::Tokio1))?)
}
