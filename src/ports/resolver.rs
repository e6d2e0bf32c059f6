use async_trait::async_trait;
use thiserror::Error;

/// Tag every transformer hop registers under.
pub const TRANSFORMER_TAG: &str = "transformer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub name: String,
    pub address: String,
    pub port: u16,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("service registry request failed: {0}")]
    Request(String),
    #[error("service registry answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Healthy instances of `name` carrying `tag`. May be empty.
    async fn resolve(&self, name: &str, tag: &str) -> Result<Vec<ServiceInstance>, ResolverError>;

    async fn register(&self, instance: &ServiceInstance, tags: &[String])
        -> Result<(), ResolverError>;
}
