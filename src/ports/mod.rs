//! Ports - Trait definitions the application services depend on.

pub mod channel;
pub mod hop;
pub mod media;
pub mod resolver;
pub mod storage;
