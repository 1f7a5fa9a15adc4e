//! Streaming module: partitioning strategies, the streaming manager and its
//! configuration surface.

pub mod strategy;
pub mod manager;
pub mod config;

pub use strategy::StreamingStrategy;
pub use manager::{StorageConstraints, StreamingManager, StreamingPlan, StreamingWarning};
pub use config::{platform_default_ram_mb, SizeMode, StreamingOptions, StreamingType};
