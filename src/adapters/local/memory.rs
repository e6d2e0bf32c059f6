//! In-process message channel for single-node runs and tests.

use crate::ports::channel::{Acknowledger, ChannelError, Delivery, DeliveryStream, MessageChannel};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Acked(Bytes),
    Nacked { body: Bytes, requeue: bool },
}

#[derive(Default)]
struct State {
    topics: HashSet<String>,
    queues: HashMap<String, VecDeque<Bytes>>,
    published: HashMap<String, Vec<Bytes>>,
    settlements: Vec<Settlement>,
    offline: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, topic: &str, body: Bytes, front: bool) {
        {
            let mut state = self.lock();
            let queue = state.queues.entry(topic.to_string()).or_default();
            if front {
                queue.push_front(body);
            } else {
                queue.push_back(body);
            }
        }
        self.notify.notify_waiters();
    }

    async fn next(&self, topic: &str) -> Bytes {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(body) = self.lock().queues.get_mut(topic).and_then(VecDeque::pop_front) {
                return body;
            }
            notified.await;
        }
    }
}

/// FIFO per topic, shared by every clone.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    shared: Arc<Shared>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload published on `topic`, consumed or not.
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.shared
            .lock()
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.shared.lock().settlements.clone()
    }

    /// Payloads waiting on `topic`.
    pub fn pending(&self, topic: &str) -> usize {
        self.shared.lock().queues.get(topic).map_or(0, VecDeque::len)
    }

    /// While offline every publish fails, as if the broker were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.shared.lock().offline = offline;
    }
}

struct MemoryAck {
    shared: Arc<Shared>,
    topic: String,
    body: Bytes,
}

#[async_trait]
impl Acknowledger for MemoryAck {
    async fn ack(self: Box<Self>) -> Result<(), ChannelError> {
        let MemoryAck { shared, body, .. } = *self;
        shared.lock().settlements.push(Settlement::Acked(body));
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), ChannelError> {
        let MemoryAck {
            shared,
            topic,
            body,
        } = *self;
        shared.lock().settlements.push(Settlement::Nacked {
            body: body.clone(),
            requeue,
        });
        if requeue {
            shared.push(&topic, body, true);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn declare_topic(&self, topic: &str) -> Result<(), ChannelError> {
        self.shared.lock().topics.insert(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError> {
        {
            let mut state = self.shared.lock();
            if state.offline {
                return Err(ChannelError::Connection("memory channel is offline".to_string()));
            }
            state.topics.insert(topic.to_string());
            state
                .published
                .entry(topic.to_string())
                .or_default()
                .push(payload.clone());
        }
        self.shared.push(topic, payload, false);
        Ok(())
    }

    async fn consume(&self, topic: &str) -> Result<DeliveryStream, ChannelError> {
        let stream = futures::stream::unfold(
            (self.shared.clone(), topic.to_string()),
            |(shared, topic)| async move {
                let body = shared.next(&topic).await;
                let acker = MemoryAck {
                    shared: shared.clone(),
                    topic: topic.clone(),
                    body: body.clone(),
                };
                Some((Delivery::new(body, Box::new(acker)), (shared, topic)))
            },
        );
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_publish_then_consume_in_order() {
        let channel = MemoryChannel::new();
        channel.declare_topic("jobs").await.unwrap();
        channel.declare_topic("jobs").await.unwrap();
        channel.publish("jobs", Bytes::from_static(b"1")).await.unwrap();
        channel.publish("jobs", Bytes::from_static(b"2")).await.unwrap();

        let mut deliveries = channel.consume("jobs").await.unwrap();
        let first = deliveries.next().await.unwrap();
        let second = deliveries.next().await.unwrap();
        assert_eq!(first.body, Bytes::from_static(b"1"));
        assert_eq!(second.body, Bytes::from_static(b"2"));

        first.ack().await.unwrap();
        second.nack(false).await.unwrap();
        assert_eq!(
            channel.settlements(),
            vec![
                Settlement::Acked(Bytes::from_static(b"1")),
                Settlement::Nacked {
                    body: Bytes::from_static(b"2"),
                    requeue: false
                }
            ]
        );
        assert_eq!(channel.pending("jobs"), 0);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let channel = MemoryChannel::new();
        let mut deliveries = channel.consume("jobs").await.unwrap();

        let publisher = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            publisher
                .publish("jobs", Bytes::from_static(b"late"))
                .await
                .unwrap();
        });

        let delivery = tokio::time::timeout(std::time::Duration::from_secs(5), deliveries.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.body, Bytes::from_static(b"late"));
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers_first() {
        let channel = MemoryChannel::new();
        channel.publish("jobs", Bytes::from_static(b"a")).await.unwrap();
        channel.publish("jobs", Bytes::from_static(b"b")).await.unwrap();

        let mut deliveries = channel.consume("jobs").await.unwrap();
        deliveries.next().await.unwrap().nack(true).await.unwrap();

        let again = deliveries.next().await.unwrap();
        assert_eq!(again.body, Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn test_offline_publish_fails() {
        let channel = MemoryChannel::new();
        channel.set_offline(true);
        assert!(channel
            .publish("jobs", Bytes::from_static(b"x"))
            .await
            .is_err());
        assert!(channel.published("jobs").is_empty());

        channel.set_offline(false);
        channel.publish("jobs", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(channel.published("jobs").len(), 1);
    }
}
