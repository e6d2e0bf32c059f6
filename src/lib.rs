//! Vidcast - video hosting backend
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (video events, av commands, transform routes)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Encode worker and transformer chain
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Redis message channel used by the encoder
//! - `aws`: S3 object storage
//! - `full`: All features

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub mod proto {
    pub mod video {
        tonic::include_proto!("video.v1");
    }

    pub mod transformer {
        tonic::include_proto!("transformer.v1");
    }
}

pub use application::chain::{request_chain, TransformChain};
pub use application::encoder::{EncodeSettings, EncodeWorker};
pub use domain::video::{VideoEvent, VideoStatus};
