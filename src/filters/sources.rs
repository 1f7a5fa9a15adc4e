//! Source nodes.

use crate::core::buffer::PixelBuffer;
use crate::core::context::GenerateContext;
use crate::core::error::{BufferError, PipelineResult};
use crate::core::node::{FilterMetadata, RasterFilter, RegionPolicy};
use crate::core::region::{Region, DIMENSION};
use crate::core::types::{ComponentType, MetadataSnapshot, OutputInformation, PixelLayout};
use crate::filters::samples::{encode, working_layout};
use rayon::prelude::*;
use std::sync::Arc;

/// Serves a raster held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    region: Region,
    buffer: Arc<PixelBuffer>,
    metadata: MetadataSnapshot,
    policy: RegionPolicy,
}

impl MemorySource {
    pub fn new(size: [u64; DIMENSION], buffer: PixelBuffer) -> Result<Self, BufferError> {
        let region = Region::from_size(size);
        if buffer.pixel_count() as u64 != region.pixel_count() {
            return Err(BufferError::Length {
                expected: region.pixel_count() as usize * buffer.layout().bytes_per_pixel(),
                got: buffer.as_bytes().len(),
            });
        }
        Ok(Self {
            region,
            buffer: Arc::new(buffer),
            metadata: MetadataSnapshot::new(),
            policy: RegionPolicy::Partial,
        })
    }

    /// Always produce the whole raster, like a format that cannot decode a
    /// window.
    pub fn whole_extent_only(mut self) -> Self {
        self.policy = RegionPolicy::WholeExtent;
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataSnapshot) -> Self {
        self.metadata = metadata;
        self
    }
}

impl RasterFilter for MemorySource {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("memory_source", "Memory Source")
            .description("Raster held in memory")
            .build()
    }

    fn output_information(&self, _inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        Ok(OutputInformation::new(self.region, self.buffer.layout())
            .with_metadata(self.metadata.clone()))
    }

    fn region_policy(&self) -> RegionPolicy {
        self.policy
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        Ok(self.buffer.extract(&self.region, &ctx.requested_region())?)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}

/// Every component of every pixel set to one value.
#[derive(Debug, Clone)]
pub struct ConstantSource {
    size: [u64; DIMENSION],
    layout: PixelLayout,
    value: f64,
}

impl ConstantSource {
    pub fn new(size: [u64; DIMENSION], layout: PixelLayout, value: f64) -> Self {
        Self { size, layout, value }
    }
}

impl RasterFilter for ConstantSource {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("constant_source", "Constant")
            .description("Uniform raster")
            .build()
    }

    fn output_information(&self, _inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        Ok(OutputInformation::new(Region::from_size(self.size), self.layout))
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        let work = working_layout(self.layout);
        let parts = if self.layout.component.is_complex() { 2 } else { 1 };
        // Complex components get the value on the real part only.
        let samples: Vec<f64> = (0..self.layout.components * parts)
            .map(|i| if i % parts == 0 { self.value } else { 0.0 })
            .collect();
        let pixel = encode(&samples, work, self.layout)?;

        let count = ctx.requested_region().pixel_count() as usize;
        Ok(PixelBuffer::from_bytes(
            self.layout,
            count,
            pixel.as_bytes().repeat(count),
        )?)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}

/// Single-band ramp: the pixel at (x, y) holds `x + y * width`.
#[derive(Debug, Clone)]
pub struct GradientSource {
    size: [u64; DIMENSION],
    component: ComponentType,
    block_size: Option<[u64; DIMENSION]>,
}

impl GradientSource {
    pub fn new(size: [u64; DIMENSION], component: ComponentType) -> Self {
        Self {
            size,
            component,
            block_size: None,
        }
    }

    /// Advertise a native block grid.
    pub fn with_block_size(mut self, block_size: [u64; DIMENSION]) -> Self {
        self.block_size = Some(block_size);
        self
    }
}

impl RasterFilter for GradientSource {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("gradient_source", "Gradient")
            .description("Ramp of linear pixel indices")
            .build()
    }

    fn output_information(&self, _inputs: &[OutputInformation]) -> PipelineResult<OutputInformation> {
        let mut info = OutputInformation::new(
            Region::from_size(self.size),
            PixelLayout::scalar(self.component),
        )
        .with_metadata(MetadataSnapshot::new().with("generator", "gradient"));
        if let Some(block_size) = self.block_size {
            info = info.with_block_size(block_size);
        }
        Ok(info)
    }

    fn generate(&self, ctx: &GenerateContext<'_>) -> PipelineResult<PixelBuffer> {
        let region = ctx.requested_region();
        let layout = PixelLayout::scalar(self.component);
        let work = working_layout(layout);
        let parts = if self.component.is_complex() { 2 } else { 1 };
        let width = region.width() as usize;
        let full_width = self.size[0] as f64;

        let mut samples = vec![0.0f64; region.pixel_count() as usize * parts];
        samples
            .par_chunks_mut((width * parts).max(1))
            .enumerate()
            .for_each(|(row, line)| {
                let y = (region.index[1] + row as i64) as f64;
                for (col, pixel) in line.chunks_exact_mut(parts).enumerate() {
                    let x = (region.index[0] + col as i64) as f64;
                    pixel[0] = x + y * full_width;
                }
            });
        ctx.report_progress(0.5);
        let buffer = encode(&samples, work, layout)?;
        ctx.report_progress(1.0);
        Ok(buffer)
    }

    fn clone_box(&self) -> Box<dyn RasterFilter> {
        Box::new(self.clone())
    }
}
