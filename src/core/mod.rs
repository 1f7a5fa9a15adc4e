//! Core types and traits for the Strata streaming engine.
//!
//! This module contains the foundational types that make up a pipeline:
//! - Region arithmetic
//! - Pixel layouts, buffers and the buffer converter
//! - The node contract and its generation context
//! - Error types

pub mod region;
pub mod types;
pub mod buffer;
pub mod convert;
pub mod error;
pub mod context;
pub mod node;

// Re-export commonly used types
pub use region::{Region, DIMENSION};
pub use types::{ComponentType, PixelLayout, OutputInformation, MetadataSnapshot};
pub use buffer::PixelBuffer;
pub use convert::{convert, convert_buffer};
pub use error::{
    NodeId, StrataError, StrataResult, RegionError, BufferError, PipelineError, PipelineResult,
    ConversionError, StorageError, StorageResult, WriteError, ConfigError,
};
pub use context::{GenerateContext, InputView};
pub use node::{RasterFilter, FilterMetadata, RegionPolicy};
