use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("broker command failed: {0}")]
    Command(String),
}

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> Result<(), ChannelError>;
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), ChannelError>;
}

/// One message handed out by [`MessageChannel::consume`].
///
/// Dropping a delivery without settling it leaves it pending in the broker.
pub struct Delivery {
    pub body: Bytes,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Bytes, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, acker }
    }

    pub async fn ack(self) -> Result<(), ChannelError> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), ChannelError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Ends when the broker connection is lost.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Idempotent.
    async fn declare_topic(&self, topic: &str) -> Result<(), ChannelError>;

    /// Retries once after a reconnect and topic redeclaration, then gives up.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError>;

    async fn consume(&self, topic: &str) -> Result<DeliveryStream, ChannelError>;
}
