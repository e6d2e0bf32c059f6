//! gRPC transport for the transformer chain.

pub mod client;
pub mod server;

pub use client::GrpcHopClient;
pub use server::{serve, TransformerGrpc};
