//! Graph module for managing pipelines.
//!
//! A pipeline is a directed acyclic graph (DAG) where nodes are raster
//! filters and edges feed one node's output into another node's input slot.

pub mod structure;
pub mod topology;
pub mod propagation;

// Re-export commonly used types
pub use structure::{PipelineGraph, GraphNode, NodeState};
pub use topology::TopologyAnalyzer;
