//! Local adapters for single-host deployment and tests.

pub mod fs;
pub mod memory;
#[cfg(feature = "local")]
pub mod redis;
pub mod registry;

pub use fs::FsAdapter;
pub use memory::MemoryChannel;
#[cfg(feature = "local")]
pub use redis::RedisChannel;
pub use registry::StaticResolver;
