//! Filter module.
//!
//! A small set of nodes for building pipelines: sources, point-wise
//! operators, a neighborhood operator and band stacking.

pub mod sources;
pub mod pointwise;
pub mod neighborhood;
pub mod stack;
mod samples;

pub use sources::{ConstantSource, GradientSource, MemorySource};
pub use pointwise::{CastFilter, LinearTransform};
pub use neighborhood::BoxMean;
pub use stack::BandStack;
