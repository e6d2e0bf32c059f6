//! Application layer: services written against the ports.

pub mod chain;
pub mod encoder;
pub mod relay;
