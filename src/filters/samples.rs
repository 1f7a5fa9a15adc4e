//! f64 working buffers shared by the demo filters.

use crate::core::buffer::PixelBuffer;
use crate::core::convert::convert_buffer;
use crate::core::error::PipelineResult;
use crate::core::types::{ComponentType, PixelLayout};

/// f64 layout (or complex f64) holding `layout` without loss of range.
pub(crate) fn working_layout(layout: PixelLayout) -> PixelLayout {
    let component = if layout.component.is_complex() {
        ComponentType::CF64
    } else {
        ComponentType::F64
    };
    PixelLayout::new(component, layout.components)
}

/// Samples of `buffer` as f64, in [`working_layout`] order.
///
/// Complex components come out as (real, imaginary) pairs.
pub(crate) fn decode(buffer: &PixelBuffer) -> PipelineResult<Vec<f64>> {
    let work = convert_buffer(buffer, working_layout(buffer.layout()))?;
    Ok(work.to_vec::<f64>())
}

/// Encode samples laid out as `work` into `target`.
pub(crate) fn encode(
    samples: &[f64],
    work: PixelLayout,
    target: PixelLayout,
) -> PipelineResult<PixelBuffer> {
    let buffer = PixelBuffer::from_slice(work, samples)?;
    Ok(convert_buffer(&buffer, target)?)
}
