//! Band stacking over co-registered inputs.

use crate::core::buffer::PixelBuffer;
use crate::core::context::GenerateContext;
use crate::core::convert::convert_buffer;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{FilterMetadata, RasterFilter};
use crate::core::types::{OutputInformation, PixelLayout};

/// Concatenates the components of its inputs, in slot order.
///
/// Every input is converted to the component type of the first one. Inputs
/// must share the same largest region.
#[derive(Debug, Clone)]
pub struct BandStack {
    inputs: usize,
}

impl BandStack {
    pub fn new(inputs: usize) -> Self {
        Self { inputs }
    }
}

impl RasterFilter for BandStack {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("band_stack", "Band Stack")
            .description("Concatenate components of co-registered inputs")
            .inputs(self.inputs)
            .co_registered()
            .build()
    }

    fn output_information(&self, inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        let first = inputs.first().ok_or_else(|| {
            PipelineError::InvalidInputs("band stack needs at least one input".to_string())
        })?;
        let components = inputs.iter().map(|i| i.layout.components).sum();
        let metadata = inputs
            .iter()
            .skip(1)
            .fold(first.metadata.clone(), |acc, i| acc.merged(&i.metadata));

        let mut info = first.clone();
        info.layout = PixelLayout::new(first.layout.component, components);
        info.metadata = metadata;
        Ok(info)
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        let region = ctx.requested_region();
        let layout = ctx.information().layout;
        let width = layout.component.size();

        let mut parts = Vec::with_capacity(ctx.input_count());
        for slot in 0..ctx.input_count() {
            let buffer = ctx.input_buffer(slot, region)?;
            let target = PixelLayout::new(layout.component, buffer.layout().components);
            parts.push(convert_buffer(&buffer, target)?);
        }

        let pixels = region.pixel_count() as usize;
        let mut out = Vec::with_capacity(pixels * layout.bytes_per_pixel());
        for pixel in 0..pixels {
            for part in &parts {
                let bpp = part.layout().components * width;
                out.extend_from_slice(&part.as_bytes()[pixel * bpp..(pixel + 1) * bpp]);
            }
        }
        Ok(PixelBuffer::from_bytes(layout, pixels, out)?)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}
