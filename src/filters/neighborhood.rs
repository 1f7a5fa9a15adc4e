//! Neighborhood filters.

use crate::core::buffer::PixelBuffer;
use crate::core::context::GenerateContext;
use crate::core::convert::convert_buffer;
use crate::core::error::PipelineResult;
use crate::core::node::{padded_request, FilterMetadata, RasterFilter};
use crate::core::region::{Region, DIMENSION};
use crate::core::types::{ComponentType, OutputInformation, PixelLayout};
use rayon::prelude::*;

/// Mean over a `(2rx + 1) x (2ry + 1)` window, clipped at the raster border.
///
/// Produces `f32` components. Complex inputs are averaged by magnitude.
#[derive(Debug, Clone)]
pub struct BoxMean {
    radius: [u64; DIMENSION],
}

impl BoxMean {
    pub fn new(radius: [u64; DIMENSION]) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> [u64; DIMENSION] {
        self.radius
    }
}

impl RasterFilter for BoxMean {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("box_mean", "Box Mean")
            .description("Windowed mean")
            .inputs(1)
            .build()
    }

    fn output_information(&self, inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        let mut info = inputs[0].clone();
        info.layout = PixelLayout::new(ComponentType::F32, info.layout.components);
        Ok(info)
    }

    fn input_requested_region(
        &self,
        _slot: usize,
        output: &Region,
        _input: &OutputInformation,
    ) -> PipelineResult<Region> {
        Ok(padded_request(output, self.radius))
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        let requested = ctx.requested_region();
        let view = ctx.input(0)?;
        let window = padded_request(&requested, self.radius).crop(&view.information.largest_region)?;
        let input = ctx.input_buffer(0, window)?;

        let components = input.layout().components;
        let magnitude = PixelLayout::new(ComponentType::F64, components);
        let values = convert_buffer(&input, magnitude)?.to_vec::<f64>();

        let width = requested.width() as usize;
        let window_width = window.width() as i64;
        let [rx, ry] = [self.radius[0] as i64, self.radius[1] as i64];
        let mut out = vec![0.0f32; requested.pixel_count() as usize * components];

        out.par_chunks_mut((width * components).max(1))
            .enumerate()
            .for_each(|(row, line)| {
                let y = requested.index[1] + row as i64;
                let y0 = (y - ry).max(window.index[1]);
                let y1 = (y + ry).min(window.upper(1) - 1);
                for (col, pixel) in line.chunks_exact_mut(components.max(1)).enumerate() {
                    let x = requested.index[0] + col as i64;
                    let x0 = (x - rx).max(window.index[0]);
                    let x1 = (x + rx).min(window.upper(0) - 1);
                    let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
                    for (c, out_value) in pixel.iter_mut().enumerate() {
                        let mut sum = 0.0;
                        for wy in y0..=y1 {
                            let base = (wy - window.index[1]) * window_width;
                            for wx in x0..=x1 {
                                let offset = (base + wx - window.index[0]) as usize;
                                sum += values[offset * components + c];
                            }
                        }
                        *out_value = (sum / count) as f32;
                    }
                }
            });

        Ok(PixelBuffer::from_slice(ctx.information().layout, &out)?)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::InputView;
    use crate::core::error::NodeId;

    #[test]
    fn test_mean_clips_at_border() {
        let layout = PixelLayout::scalar(ComponentType::U8);
        let extent = Region::from_size([3, 3]);
        let input = PixelBuffer::from_slice(layout, &[1u8, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        let in_info = OutputInformation::new(extent, layout);
        let filter = BoxMean::new([1, 1]);
        let out_info = filter.output_information(&[in_info.clone()]).unwrap();
        assert_eq!(out_info.layout, PixelLayout::scalar(ComponentType::F32));

        let requested = Region::new([0, 0], [2, 1]);
        let ctx = GenerateContext::new(
            NodeId::new(),
            requested,
            &out_info,
            vec![InputView {
                information: &in_info,
                buffered_region: extent,
                buffer: &input,
            }],
        );
        let out = filter.generate(&ctx).unwrap().to_vec::<f32>();
        assert_eq!(out, vec![3.0, 3.5]);
    }

    #[test]
    fn test_request_is_padded() {
        let filter = BoxMean::new([2, 1]);
        let info = OutputInformation::new(Region::from_size([10, 10]), PixelLayout::scalar(ComponentType::U8));
        assert_eq!(
            filter
                .input_requested_region(0, &Region::new([4, 4], [2, 2]), &info)
                .unwrap(),
            Region::new([2, 3], [6, 4])
        );
    }
}
