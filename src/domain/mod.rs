//! Domain layer - Pure business logic.

pub mod av;
pub mod transform;
pub mod video;
