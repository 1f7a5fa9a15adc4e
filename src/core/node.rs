//! RasterFilter trait and filter metadata.
//!
//! The RasterFilter trait is the node contract of the pipeline. It uses a
//! three-pass design: a cheap metadata pass ([`RasterFilter::output_information`]),
//! a requested-region pass ([`RasterFilter::input_requested_region`]) that
//! walks the graph before any pixel is computed, and a materialization pass
//! ([`RasterFilter::generate`]) that produces exactly the requested pixels.

use crate::core::buffer::PixelBuffer;
use crate::core::context::GenerateContext;
use crate::core::error::PipelineResult;
use crate::core::region::{Region, DIMENSION};
use crate::core::types::OutputInformation;
use serde::{Deserialize, Serialize};

/// Whether a node can produce arbitrary sub-regions of its extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionPolicy {
    /// Any sub-region can be generated on its own.
    #[default]
    Partial,
    /// Requests are always enlarged to the largest possible region.
    WholeExtent,
}

/// Metadata describing a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterMetadata {
    /// Unique identifier for this filter type (e.g., "box_mean")
    pub id: String,
    /// Human-readable name (e.g., "Box Mean")
    pub name: String,
    /// Detailed description
    pub description: String,
    /// Number of input slots
    pub inputs: usize,
    /// Whether every input must share the same largest possible region
    pub co_registered: bool,
}

impl FilterMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> FilterMetadataBuilder {
        FilterMetadataBuilder::new(id, name)
    }

    /// Whether the filter produces data without any input.
    pub fn is_source(&self) -> bool {
        self.inputs == 0
    }
}

/// Builder for FilterMetadata.
pub struct FilterMetadataBuilder {
    id: String,
    name: String,
    description: String,
    inputs: usize,
    co_registered: bool,
}

impl FilterMetadataBuilder {
    /// Create a new builder with required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            inputs: 0,
            co_registered: false,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the number of input slots.
    pub fn inputs(mut self, inputs: usize) -> Self {
        self.inputs = inputs;
        self
    }

    /// Require every input to cover the same largest possible region.
    pub fn co_registered(mut self) -> Self {
        self.co_registered = true;
        self
    }

    /// Build the metadata.
    pub fn build(self) -> FilterMetadata {
        FilterMetadata {
            id: self.id,
            name: self.name,
            description: self.description,
            inputs: self.inputs,
            co_registered: self.co_registered,
        }
    }
}

/// The core trait for all pipeline nodes.
///
/// # Example
///
/// ```ignore
/// use strata::prelude::*;
///
/// #[derive(Clone)]
/// struct Invert;
///
/// impl RasterFilter for Invert {
///     fn metadata(&self) -> FilterMetadata {
///         FilterMetadata::builder("invert", "Invert").inputs(1).build()
///     }
///
///     fn output_information(&self, inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
///         Ok(inputs[0].clone())
///     }
///
///     fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
///         let mut out = ctx.input_buffer(0, ctx.requested_region())?;
///         out.as_bytes_mut().iter_mut().for_each(|b| *b = !*b);
///         Ok(out)
///     }
///
///     fn clone_box(&self) -> Box<dyn RasterFilter> {
///         Box::new(self.clone())
///     }
/// }
/// ```
pub trait RasterFilter: Send + Sync {
    /// Static description of the filter.
    fn metadata(&self) -> FilterMetadata;

    /// Metadata pass: largest region, pixel layout, block grid.
    ///
    /// `inputs` holds the information of every input slot, in slot order.
    /// Must not touch pixel data.
    fn output_information(&self, inputs: &[OutputInformation]) -> PipelineResult<OutputInformation>;

    /// Whether the node can generate partial regions.
    fn region_policy(&self) -> RegionPolicy {
        RegionPolicy::Partial
    }

    /// Region of input `slot` needed to produce `output`.
    ///
    /// The returned region is cropped to the input's largest region by the
    /// graph. The default maps the request 1:1.
    fn input_requested_region(
        &self,
        _slot: usize,
        output: &Region,
        _input: &OutputInformation,
    ) -> PipelineResult<Region> {
        Ok(*output)
    }

    /// Produce exactly `ctx.requested_region()` pixels.
    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer>;

    /// Clone the filter into a box.
    fn clone_box(&self) -> Box<dyn RasterFilter>;
}

impl Clone for Box<dyn RasterFilter> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Input request of a neighborhood operator with the given support radius.
pub fn padded_request(output: &Region, radius: [u64; DIMENSION]) -> Region {
    output.padded(radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = FilterMetadata::builder("band_stack", "Band Stack")
            .description("Concatenate components")
            .inputs(2)
            .co_registered()
            .build();
        assert_eq!(meta.inputs, 2);
        assert!(meta.co_registered);
        assert!(!meta.is_source());
        assert!(FilterMetadata::builder("src", "Source").build().is_source());
    }

    #[test]
    fn test_padded_request() {
        let out = Region::new([10, 10], [5, 5]);
        assert_eq!(padded_request(&out, [2, 1]), Region::new([8, 9], [9, 7]));
    }
}
