//! Raw pixel buffers.
//!
//! A [`PixelBuffer`] is a contiguous, row-major, band-interleaved-by-pixel
//! byte vector tagged with its [`PixelLayout`]. Samples are stored in native
//! byte order.

use crate::core::error::BufferError;
use crate::core::region::Region;
use crate::core::types::PixelLayout;
use bytemuck::Pod;

/// Contiguous pixel data tagged with its layout and pixel count.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    layout: PixelLayout,
    pixel_count: usize,
}

impl PixelBuffer {
    /// Zero-filled buffer of `pixel_count` pixels.
    pub fn new(layout: PixelLayout, pixel_count: usize) -> Self {
        Self {
            data: vec![0; layout.bytes_per_pixel() * pixel_count],
            layout,
            pixel_count,
        }
    }

    /// Wrap existing bytes, checking their length against the layout.
    pub fn from_bytes(
        layout: PixelLayout,
        pixel_count: usize,
        data: Vec<u8>,
    ) -> Result<Self, BufferError> {
        let expected = layout.bytes_per_pixel() * pixel_count;
        if data.len() != expected {
            return Err(BufferError::Length {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            layout,
            pixel_count,
        })
    }

    /// Build a buffer from typed samples (complex components take two samples).
    pub fn from_slice<T: Pod>(layout: PixelLayout, samples: &[T]) -> Result<Self, BufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(samples);
        let bpp = layout.bytes_per_pixel();
        if bpp == 0 || bytes.len() % bpp != 0 {
            return Err(BufferError::Length {
                expected: bytes.len().next_multiple_of(bpp.max(1)),
                got: bytes.len(),
            });
        }
        Self::from_bytes(layout, bytes.len() / bpp, bytes.to_vec())
    }

    /// Copy the samples out as `T`.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        self.data
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes of a single pixel.
    pub fn pixel(&self, index: usize) -> Option<&[u8]> {
        let bpp = self.layout.bytes_per_pixel();
        self.data.get(index * bpp..(index + 1) * bpp)
    }

    /// Copy the pixels of `sub` out of a buffer covering `own`.
    pub fn extract(&self, own: &Region, sub: &Region) -> Result<PixelBuffer, BufferError> {
        if *sub == *own {
            return Ok(self.clone());
        }
        if !own.contains(sub) {
            return Err(BufferError::NotContained {
                region: *sub,
                bounds: *own,
            });
        }

        let bpp = self.layout.bytes_per_pixel();
        let row_bytes = sub.width() as usize * bpp;
        let mut out = Vec::with_capacity(row_bytes * sub.height() as usize);
        for row in 0..sub.height() as i64 {
            let start = own
                .linear_offset([sub.index[0], sub.index[1] + row])
                .unwrap_or_default()
                * bpp;
            out.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        PixelBuffer::from_bytes(self.layout, sub.pixel_count() as usize, out)
    }

    /// Copy `src` (covering `src_region`) into this buffer (covering `own`).
    pub fn paste(
        &mut self,
        own: &Region,
        src: &PixelBuffer,
        src_region: &Region,
    ) -> Result<(), BufferError> {
        if src.layout != self.layout {
            return Err(BufferError::LayoutMismatch {
                expected: self.layout,
                got: src.layout,
            });
        }
        if !own.contains(src_region) {
            return Err(BufferError::NotContained {
                region: *src_region,
                bounds: *own,
            });
        }
        let expected = src_region.pixel_count() as usize * self.layout.bytes_per_pixel();
        if src.data.len() != expected {
            return Err(BufferError::Length {
                expected,
                got: src.data.len(),
            });
        }

        let bpp = self.layout.bytes_per_pixel();
        let row_bytes = src_region.width() as usize * bpp;
        for (row, chunk) in src.data.chunks_exact(row_bytes.max(1)).enumerate() {
            let start = own
                .linear_offset([src_region.index[0], src_region.index[1] + row as i64])
                .unwrap_or_default()
                * bpp;
            self.data[start..start + row_bytes].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Keep (and reorder) the listed 0-based components.
    pub fn select_components(&self, bands: &[usize]) -> Result<PixelBuffer, BufferError> {
        let components = self.layout.components;
        if let Some(&index) = bands.iter().find(|&&b| b >= components) {
            return Err(BufferError::ComponentOutOfRange { index, components });
        }

        let width = self.layout.component.size();
        let bpp = self.layout.bytes_per_pixel();
        let layout = PixelLayout::new(self.layout.component, bands.len());
        let mut out = Vec::with_capacity(layout.bytes_per_pixel() * self.pixel_count);
        for pixel in self.data.chunks_exact(bpp.max(1)) {
            for &band in bands {
                out.extend_from_slice(&pixel[band * width..(band + 1) * width]);
            }
        }
        PixelBuffer::from_bytes(layout, self.pixel_count, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ComponentType;

    fn ramp(region: &Region) -> PixelBuffer {
        let values: Vec<u16> = (0..region.pixel_count() as u16).collect();
        PixelBuffer::from_slice(PixelLayout::scalar(ComponentType::U16), &values).unwrap()
    }

    #[test]
    fn test_from_bytes_checks_length() {
        let layout = PixelLayout::new(ComponentType::U8, 3);
        assert!(PixelBuffer::from_bytes(layout, 2, vec![0; 6]).is_ok());
        assert_eq!(
            PixelBuffer::from_bytes(layout, 2, vec![0; 5]).unwrap_err(),
            BufferError::Length { expected: 6, got: 5 }
        );
    }

    #[test]
    fn test_from_slice_rejects_partial_pixel() {
        let layout = PixelLayout::new(ComponentType::U8, 2);
        assert!(PixelBuffer::from_slice(layout, &[1u8, 2, 3]).is_err());
    }

    #[test]
    fn test_extract_sub_region() {
        let own = Region::new([10, 10], [4, 3]);
        let buffer = ramp(&own);
        let sub = Region::new([11, 11], [2, 2]);
        let out = buffer.extract(&own, &sub).unwrap();
        assert_eq!(out.to_vec::<u16>(), vec![5, 6, 9, 10]);

        let outside = Region::new([0, 0], [2, 2]);
        assert!(buffer.extract(&own, &outside).is_err());
    }

    #[test]
    fn test_paste_then_extract() {
        let own = Region::from_size([4, 4]);
        let mut canvas = PixelBuffer::new(PixelLayout::scalar(ComponentType::U16), 16);
        let piece_region = Region::new([1, 2], [3, 2]);
        let piece = ramp(&piece_region);
        canvas.paste(&own, &piece, &piece_region).unwrap();
        assert_eq!(canvas.extract(&own, &piece_region).unwrap(), piece);
        assert_eq!(canvas.to_vec::<u16>()[..8], [0; 8]);
    }

    #[test]
    fn test_paste_layout_mismatch() {
        let own = Region::from_size([2, 2]);
        let mut canvas = PixelBuffer::new(PixelLayout::scalar(ComponentType::U8), 4);
        let piece = ramp(&own);
        assert!(matches!(
            canvas.paste(&own, &piece, &own),
            Err(BufferError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn test_select_components_reorders() {
        let layout = PixelLayout::new(ComponentType::U8, 3);
        let buffer = PixelBuffer::from_slice(layout, &[1u8, 2, 3, 4, 5, 6]).unwrap();
        let picked = buffer.select_components(&[2, 0]).unwrap();
        assert_eq!(picked.layout().components, 2);
        assert_eq!(picked.to_vec::<u8>(), vec![3, 1, 6, 4]);
        assert!(buffer.select_components(&[3]).is_err());
    }
}
