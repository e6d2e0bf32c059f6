//! Redis MessageChannel implementation.

use super::error::QueueError;
use super::pool;
use crate::config::ChannelConfig;
use crate::ports::channel::{Acknowledger, ChannelError, Delivery, DeliveryStream, MessageChannel};
use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::redis::{self, AsyncCommands, Direction};
use deadpool_redis::Pool;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

fn topics_key(namespace: &str) -> String {
    format!("{}:topics", namespace)
}

fn queue_key(namespace: &str, topic: &str) -> String {
    format!("{}:queue:{}", namespace, topic)
}

fn processing_key(namespace: &str, topic: &str, consumer: &str) -> String {
    format!("{}:processing:{}:{}", namespace, topic, consumer)
}

/// Reliable Redis queue. Connection settings belong to the instance, so
/// several channels in one process reconnect independently.
pub struct RedisChannel {
    config: ChannelConfig,
    pool: RwLock<Pool>,
}

impl RedisChannel {
    pub async fn connect(config: ChannelConfig) -> Result<Self, QueueError> {
        let pool = pool::connect(&config.redis_url).await?;
        info!(url = %config.redis_url, namespace = %config.namespace, "connected to redis");
        Ok(Self {
            config,
            pool: RwLock::new(pool),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    async fn current_pool(&self) -> Pool {
        self.pool.read().await.clone()
    }

    /// Hand back deliveries a previous run of this consumer never settled.
    async fn recover(&self, queue: &str, processing: &str) -> Result<usize, QueueError> {
        let mut conn = self.current_pool().await.get().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<Vec<u8>> = conn
                .lmove(processing, queue, Direction::Right, Direction::Right)
                .await?;
            if moved.is_none() {
                return Ok(recovered);
            }
            recovered += 1;
        }
    }
}

/// Broker operations a publish is built from.
#[async_trait]
trait Publisher: Sync {
    async fn push(&self, topic: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Replace the connection with a fresh one.
    async fn reconnect(&self) -> Result<(), QueueError>;

    async fn declare(&self, topic: &str) -> Result<(), QueueError>;
}

#[async_trait]
impl Publisher for RedisChannel {
    async fn push(&self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.current_pool().await.get().await?;
        conn.lpush::<_, _, ()>(queue_key(&self.config.namespace, topic), payload)
            .await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), QueueError> {
        let pool = pool::connect(&self.config.redis_url).await?;
        *self.pool.write().await = pool;
        info!(url = %self.config.redis_url, "reconnected to redis");
        Ok(())
    }

    async fn declare(&self, topic: &str) -> Result<(), QueueError> {
        let mut conn = self.current_pool().await.get().await?;
        conn.sadd::<_, _, ()>(topics_key(&self.config.namespace), topic)
            .await?;
        Ok(())
    }
}

/// Push once. On failure reconnect and redeclare exactly once, then push a
/// second and last time.
async fn publish_with_retry<P: Publisher + ?Sized>(
    publisher: &P,
    topic: &str,
    payload: &[u8],
) -> Result<(), QueueError> {
    let first = match publisher.push(topic, payload).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    warn!(topic, error = %first, "publish failed, reconnecting once");

    publisher.reconnect().await?;
    publisher.declare(topic).await?;
    publisher.push(topic, payload).await.map_err(|e| {
        error!(topic, error = %e, "publish failed after reconnect");
        e
    })
}

struct Consumer {
    pool: Pool,
    queue: String,
    processing: String,
    timeout_secs: f64,
}

impl Consumer {
    async fn next_body(&self) -> Result<Vec<u8>, QueueError> {
        loop {
            let mut conn = self.pool.get().await?;
            let moved: Option<Vec<u8>> = conn
                .blmove(
                    &self.queue,
                    &self.processing,
                    Direction::Right,
                    Direction::Left,
                    self.timeout_secs,
                )
                .await?;
            if let Some(body) = moved {
                return Ok(body);
            }
        }
    }

    fn acker(&self, body: Bytes) -> RedisAck {
        RedisAck {
            pool: self.pool.clone(),
            queue: self.queue.clone(),
            processing: self.processing.clone(),
            body,
        }
    }
}

struct RedisAck {
    pool: Pool,
    queue: String,
    processing: String,
    body: Bytes,
}

impl RedisAck {
    async fn settle(self, requeue: bool) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        if requeue {
            // Tail of the queue is consumed next.
            let () = redis::pipe()
                .atomic()
                .lrem(&self.processing, 1, self.body.as_ref())
                .ignore()
                .rpush(&self.queue, self.body.as_ref())
                .ignore()
                .query_async(&mut conn)
                .await?;
        } else {
            conn.lrem::<_, _, ()>(&self.processing, 1, self.body.as_ref())
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for RedisAck {
    async fn ack(self: Box<Self>) -> Result<(), ChannelError> {
        Ok((*self).settle(false).await?)
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), ChannelError> {
        Ok((*self).settle(requeue).await?)
    }
}

#[async_trait]
impl MessageChannel for RedisChannel {
    async fn declare_topic(&self, topic: &str) -> Result<(), ChannelError> {
        Ok(self.declare(topic).await?)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError> {
        Ok(publish_with_retry(self, topic, &payload).await?)
    }

    async fn consume(&self, topic: &str) -> Result<DeliveryStream, ChannelError> {
        let queue = queue_key(&self.config.namespace, topic);
        let processing = processing_key(&self.config.namespace, topic, &self.config.consumer);

        let recovered = self.recover(&queue, &processing).await?;
        if recovered > 0 {
            warn!(topic, recovered, "requeued unsettled deliveries from a previous run");
        }

        let consumer = Consumer {
            pool: self.current_pool().await,
            queue,
            processing,
            timeout_secs: self.config.poll_timeout_secs,
        };
        let stream = futures::stream::unfold(consumer, |consumer| async move {
            match consumer.next_body().await {
                Ok(body) => {
                    let body = Bytes::from(body);
                    let acker = consumer.acker(body.clone());
                    Some((Delivery::new(body, Box::new(acker)), consumer))
                }
                Err(e) => {
                    error!(queue = %consumer.queue, error = %e, "consume stream closed");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
