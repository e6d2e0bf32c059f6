//! Redis adapter for local deployment.
//!
//! Implements `MessageChannel` with the reliable-queue pattern: consumers
//! atomically move a payload into their own processing list and remove it
//! from there on ack, so a crashed consumer's deliveries stay recoverable.

mod channel;
mod error;
mod pool;

pub use channel::RedisChannel;
pub use error::QueueError;
