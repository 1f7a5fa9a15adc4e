//! Generation context.
//!
//! A [`GenerateContext`] gives a node read access to its inputs' buffered data
//! for the duration of one `generate` call, plus a progress hook.

use crate::core::buffer::PixelBuffer;
use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::core::region::Region;
use crate::core::types::OutputInformation;

/// Read-only view of one materialized input.
#[derive(Debug, Clone, Copy)]
pub struct InputView<'a> {
    pub information: &'a OutputInformation,
    pub buffered_region: Region,
    pub buffer: &'a PixelBuffer,
}

/// Context provided to [`RasterFilter::generate`](crate::core::node::RasterFilter::generate).
pub struct GenerateContext<'a> {
    /// ID of the node being generated.
    pub node_id: NodeId,
    requested_region: Region,
    information: &'a OutputInformation,
    inputs: Vec<InputView<'a>>,
    progress: Option<&'a (dyn Fn(f32) + 'a)>,
}

impl<'a> GenerateContext<'a> {
    /// Create a new context.
    pub fn new(
        node_id: NodeId,
        requested_region: Region,
        information: &'a OutputInformation,
        inputs: Vec<InputView<'a>>,
    ) -> Self {
        Self {
            node_id,
            requested_region,
            information,
            inputs,
            progress: None,
        }
    }

    /// Attach a progress hook.
    pub fn with_progress(mut self, progress: &'a (dyn Fn(f32) + 'a)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Region the node must produce.
    pub fn requested_region(&self) -> Region {
        self.requested_region
    }

    /// The node's own output information.
    pub fn information(&self) -> &OutputInformation {
        self.information
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Get an input by slot.
    pub fn input(&self, slot: usize) -> PipelineResult<&InputView<'a>> {
        self.inputs.get(slot).ok_or(PipelineError::InvalidSlot {
            node_id: self.node_id,
            slot,
            inputs: self.inputs.len(),
        })
    }

    /// Copy `region` out of input `slot`'s buffer.
    ///
    /// Fails with [`PipelineError::NotBuffered`] if the input's buffered
    /// region does not cover `region`.
    pub fn input_buffer(&self, slot: usize, region: Region) -> PipelineResult<PixelBuffer> {
        let input = self.input(slot)?;
        if !input.buffered_region.contains(&region) {
            return Err(PipelineError::NotBuffered {
                node_id: self.node_id,
                requested: region,
                buffered: input.buffered_region,
            });
        }
        Ok(input.buffer.extract(&input.buffered_region, &region)?)
    }

    /// Report fractional progress (0..=1) of this call.
    pub fn report_progress(&self, fraction: f32) {
        if let Some(progress) = self.progress {
            progress(fraction.clamp(0.0, 1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ComponentType, PixelLayout};
    use std::cell::Cell;

    #[test]
    fn test_input_buffer_requires_coverage() {
        let layout = PixelLayout::scalar(ComponentType::U8);
        let region = Region::from_size([4, 4]);
        let info = OutputInformation::new(region, layout);
        let buffered = Region::new([0, 0], [4, 2]);
        let data = PixelBuffer::from_slice(layout, &[1u8, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let ctx = GenerateContext::new(
            NodeId::new(),
            buffered,
            &info,
            vec![InputView {
                information: &info,
                buffered_region: buffered,
                buffer: &data,
            }],
        );

        let row = ctx.input_buffer(0, Region::new([1, 1], [2, 1])).unwrap();
        assert_eq!(row.to_vec::<u8>(), vec![6, 7]);
        assert!(matches!(
            ctx.input_buffer(0, region),
            Err(PipelineError::NotBuffered { .. })
        ));
        assert!(matches!(
            ctx.input(1),
            Err(PipelineError::InvalidSlot { slot: 1, .. })
        ));
    }

    #[test]
    fn test_report_progress_clamps() {
        let info = OutputInformation::new(
            Region::from_size([1, 1]),
            PixelLayout::scalar(ComponentType::U8),
        );
        let seen = Cell::new(-1.0f32);
        let hook = |f: f32| seen.set(f);
        let ctx = GenerateContext::new(NodeId::new(), Region::from_size([1, 1]), &info, vec![])
            .with_progress(&hook);
        ctx.report_progress(1.5);
        assert_eq!(seen.get(), 1.0);
    }
}
