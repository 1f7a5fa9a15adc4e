//! Error types for Strata.
//!
//! Uses thiserror for structured errors with context. Only structural failures
//! are errors: configuration mistakes and storage limitations that the engine
//! can route around are reported as
//! [`StreamingWarning`](crate::streaming::StreamingWarning)s instead.

use crate::core::region::Region;
use crate::core::types::{ComponentType, PixelLayout};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node in the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for Strata.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Malformed or unusable regions.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionError {
    #[error("Invalid region: negative size {size} along axis {axis}")]
    NegativeSize { axis: usize, size: i64 },

    #[error("Region {region} does not intersect {bounds}")]
    OutsideBounds { region: Region, bounds: Region },
}

/// Pixel buffers whose shape does not match what an operation expects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer holds {got} bytes, expected {expected}")]
    Length { expected: usize, got: usize },

    #[error("Pixel layout mismatch: expected {expected}, got {got}")]
    LayoutMismatch {
        expected: PixelLayout,
        got: PixelLayout,
    },

    #[error("Sub-region {region} is not inside buffer region {bounds}")]
    NotContained { region: Region, bounds: Region },

    #[error("Component {index} out of range for a {components}-component buffer")]
    ComponentOutOfRange { index: usize, components: usize },
}

/// Errors raised while walking the pipeline graph.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Missing input {slot} on node {node_id}")]
    MissingInput { node_id: NodeId, slot: usize },

    #[error("Node {node_id} has no input slot {slot} (it declares {inputs})")]
    InvalidSlot {
        node_id: NodeId,
        slot: usize,
        inputs: usize,
    },

    #[error("Input {slot} of node {node_id} covers {got}, expected {expected}")]
    RegionMismatch {
        node_id: NodeId,
        slot: usize,
        expected: Region,
        got: Region,
    },

    #[error("Cycle detected in pipeline involving nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    #[error("Output information of node {0} has not been computed")]
    InformationNotComputed(NodeId),

    #[error("Node {node_id} buffers {buffered}, which does not cover {requested}")]
    NotBuffered {
        node_id: NodeId,
        requested: Region,
        buffered: Region,
    },

    #[error("Node {node_id} produced {got} pixels for a {expected}-pixel request")]
    OutputSizeMismatch {
        node_id: NodeId,
        expected: u64,
        got: u64,
    },

    #[error("Node {node_id} failed: {error}")]
    NodeFailed { node_id: NodeId, error: String },

    /// Raised by a filter that does not know its own id; the graph reports
    /// it as [`PipelineError::NodeFailed`].
    #[error("Invalid inputs: {0}")]
    InvalidInputs(String),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Errors from the pixel buffer converter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error(
        "Unsupported conversion: {input_components} x {input} to {output_components} x {output}"
    )]
    Unsupported {
        input: ComponentType,
        input_components: usize,
        output: ComponentType,
        output_components: usize,
    },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Errors from storage backends and the backend registry.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{backend} cannot store {layout}")]
    UnsupportedLayout {
        backend: &'static str,
        layout: PixelLayout,
    },

    #[error("Write of {region} falls outside the stored extent {bounds}")]
    OutOfBounds { region: Region, bounds: Region },

    #[error("Write called before write_information on {0}")]
    NotInitialized(&'static str),

    #[error("No storage backend registered for extension '{extension}'")]
    NoBackend { extension: String },

    #[error("Storage registry is not initialized")]
    RegistryNotInitialized,

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Header serialization failed: {0}")]
    Header(#[from] serde_json::Error),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl From<image::ImageError> for StorageError {
    fn from(err: image::ImageError) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Errors raised by the streaming writers before or between partitions.
#[derive(Error, Debug, Clone)]
pub enum WriteError {
    #[error("Writer has no input node")]
    NoInput,

    #[error("Writer has no storage")]
    NoStorage,

    #[error("Multi-output writer has no outputs")]
    NoOutputs,

    #[error("Band {band} requested but the input has {components} components")]
    InvalidBands { band: usize, components: usize },

    #[error("Write aborted after {completed}/{total} partitions")]
    Aborted { completed: usize, total: usize },

    #[error(transparent)]
    Region(#[from] RegionError),
}

/// Malformed configuration documents or extended filenames.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid TOML configuration: {0}")]
    Toml(String),

    #[error("Invalid extended filename '{filename}': {reason}")]
    Filename { filename: String, reason: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.to_string())
    }
}

// ============================================================================
// Error Utilities
// ============================================================================

impl StrataError {
    /// Whether the error reflects a failed operation.
    ///
    /// A cancelled write is the only non-fatal outcome: the caller asked for it.
    pub fn is_fatal(&self) -> bool {
        !self.is_cancelled()
    }

    /// Whether a write stopped because its cancellation token was raised.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StrataError::Write(WriteError::Aborted { .. }))
    }

    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            StrataError::Pipeline(err) => err.node_id(),
            _ => None,
        }
    }
}

impl PipelineError {
    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            PipelineError::NodeNotFound(node_id)
            | PipelineError::InformationNotComputed(node_id)
            | PipelineError::MissingInput { node_id, .. }
            | PipelineError::InvalidSlot { node_id, .. }
            | PipelineError::RegionMismatch { node_id, .. }
            | PipelineError::NotBuffered { node_id, .. }
            | PipelineError::OutputSizeMismatch { node_id, .. }
            | PipelineError::NodeFailed { node_id, .. } => Some(*node_id),
            PipelineError::CycleDetected { nodes } => nodes.first().copied(),
            _ => None,
        }
    }
}

/// Result type alias for Strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

/// Result type alias for pipeline graph operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for pixel conversions.
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Result type alias for storage backends.
pub type StorageResult<T> = Result<T, StorageError>;
