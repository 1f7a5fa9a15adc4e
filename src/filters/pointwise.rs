//! Point-wise filters. Output pixel (x, y) depends on input pixel (x, y) only.

use crate::core::buffer::PixelBuffer;
use crate::core::context::GenerateContext;
use crate::core::convert::{convert_buffer, lookup};
use crate::core::error::{ConversionError, PipelineResult};
use crate::core::node::{FilterMetadata, RasterFilter};
use crate::core::types::{ComponentType, OutputInformation, PixelLayout};
use crate::filters::samples::{decode, encode, working_layout};
use rayon::prelude::*;

/// Number of slices a point-wise pass is cut into for progress reports.
const PROGRESS_STEPS: usize = 4;

/// `value * gain + offset` on every component.
///
/// Complex components are scaled by `gain`; `offset` moves the real part.
#[derive(Debug, Clone)]
pub struct LinearTransform {
    gain: f64,
    offset: f64,
    output: Option<ComponentType>,
}

impl LinearTransform {
    pub fn new(gain: f64, offset: f64) -> Self {
        Self {
            gain,
            offset,
            output: None,
        }
    }

    /// Produce `component` instead of the input's component type.
    pub fn with_output_type(mut self, component: ComponentType) -> Self {
        self.output = Some(component);
        self
    }

    fn output_layout(&self, input: PixelLayout) -> PixelLayout {
        match self.output {
            Some(component) => PixelLayout::new(component, input.components),
            None => input,
        }
    }
}

impl RasterFilter for LinearTransform {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("linear_transform", "Linear Transform")
            .description("Gain and offset")
            .inputs(1)
            .build()
    }

    fn output_information(&self, inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        let input = &inputs[0];
        let work = working_layout(input.layout);
        let layout = self.output_layout(input.layout);
        if lookup(work.component, work.components, layout.component, layout.components).is_none() {
            return Err(ConversionError::Unsupported {
                input: work.component,
                input_components: work.components,
                output: layout.component,
                output_components: layout.components,
            }
            .into());
        }
        let mut info = input.clone();
        info.layout = layout;
        Ok(info)
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        let input = ctx.input_buffer(0, ctx.requested_region())?;
        let work = working_layout(input.layout());
        let parts = if work.component.is_complex() { 2 } else { 1 };
        let mut samples = decode(&input)?;

        let step = samples.len().div_ceil(PROGRESS_STEPS).max(1);
        for (i, slice) in samples.chunks_mut(step).enumerate() {
            let start = i * step;
            slice.par_iter_mut().enumerate().for_each(|(j, v)| {
                *v *= self.gain;
                if (start + j) % parts == 0 {
                    *v += self.offset;
                }
            });
            ctx.report_progress((i + 1) as f32 / PROGRESS_STEPS as f32);
        }

        encode(&samples, work, ctx.information().layout)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}

/// Re-encodes pixels into another layout through the pixel converter.
#[derive(Debug, Clone)]
pub struct CastFilter {
    target: PixelLayout,
}

impl CastFilter {
    pub fn new(target: PixelLayout) -> Self {
        Self { target }
    }
}

impl RasterFilter for CastFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("cast", "Cast")
            .description("Convert pixel type")
            .inputs(1)
            .build()
    }

    fn output_information(&self, inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        let input = &inputs[0];
        let from = input.layout;
        if lookup(from.component, from.components, self.target.component, self.target.components).is_none() {
            return Err(ConversionError::Unsupported {
                input: from.component,
                input_components: from.components,
                output: self.target.component,
                output_components: self.target.components,
            }
            .into());
        }
        let mut info = input.clone();
        info.layout = self.target;
        Ok(info)
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        let input = ctx.input_buffer(0, ctx.requested_region())?;
        Ok(convert_buffer(&input, self.target)?)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::InputView;
    use crate::core::error::{NodeId, PipelineError};
    use crate::core::region::Region;
    use std::cell::RefCell;

    fn apply(filter: &dyn RasterFilter, input: PixelBuffer, size: [u64; 2]) -> (PixelBuffer, Vec<f32>) {
        let region = Region::from_size(size);
        let in_info = OutputInformation::new(region, input.layout());
        let out_info = filter.output_information(&[in_info.clone()]).unwrap();
        let seen = RefCell::new(Vec::new());
        let hook = |p: f32| seen.borrow_mut().push(p);
        let ctx = GenerateContext::new(
            NodeId::new(),
            region,
            &out_info,
            vec![InputView {
                information: &in_info,
                buffered_region: region,
                buffer: &input,
            }],
        )
        .with_progress(&hook);
        let out = filter.generate(&ctx).unwrap();
        drop(ctx);
        (out, seen.into_inner())
    }

    #[test]
    fn test_linear_keeps_layout_and_reports_progress() {
        let layout = PixelLayout::scalar(ComponentType::U8);
        let input = PixelBuffer::from_slice(layout, &[0u8, 10, 100, 200]).unwrap();
        let (out, progress) = apply(&LinearTransform::new(2.0, 1.0), input, [2, 2]);
        assert_eq!(out.layout(), layout);
        // 401 wraps to 145.
        assert_eq!(out.to_vec::<u8>(), vec![1, 21, 201, 145]);
        assert_eq!(progress, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_linear_complex_offset_on_real_part() {
        let layout = PixelLayout::scalar(ComponentType::CF32);
        let input = PixelBuffer::from_slice(layout, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let (out, _) = apply(&LinearTransform::new(2.0, 0.5), input, [2, 1]);
        assert_eq!(out.to_vec::<f32>(), vec![2.5, 4.0, 6.5, 8.0]);
    }

    #[test]
    fn test_linear_output_type() {
        let layout = PixelLayout::scalar(ComponentType::U8);
        let input = PixelBuffer::from_slice(layout, &[3u8]).unwrap();
        let filter = LinearTransform::new(0.5, 0.0).with_output_type(ComponentType::F64);
        let (out, _) = apply(&filter, input, [1, 1]);
        assert_eq!(out.to_vec::<f64>(), vec![1.5]);
    }

    #[test]
    fn test_cast_filter() {
        let input = PixelBuffer::from_slice(
            PixelLayout::scalar(ComponentType::CI16),
            &[3i16, 4],
        )
        .unwrap();
        let target = PixelLayout::scalar(ComponentType::F32);
        let (out, _) = apply(&CastFilter::new(target), input, [1, 1]);
        assert_eq!(out.to_vec::<f32>(), vec![5.0]);

        let filter = CastFilter::new(PixelLayout::new(ComponentType::U8, 3));
        let info = OutputInformation::new(
            Region::from_size([1, 1]),
            PixelLayout::new(ComponentType::U8, 2),
        );
        assert!(matches!(
            filter.output_information(&[info]),
            Err(PipelineError::Conversion(ConversionError::Unsupported { .. }))
        ));
    }
}
