//! PNG output through the `image` crate.
//!
//! PNG has no partial write, so the raster is assembled in memory and
//! encoded once in [`RasterStorage::finalize`].

use crate::core::buffer::PixelBuffer;
use crate::core::convert::convert_buffer;
use crate::core::error::{StorageError, StorageResult};
use crate::core::region::Region;
use crate::core::types::{ComponentType, PixelLayout};
use crate::io::storage::{check_write, RasterStorage, StorageInformation};
use image::{ExtendedColorType, ImageFormat};
use log::debug;
use std::path::{Path, PathBuf};

pub struct PngStorage {
    path: PathBuf,
    information: Option<StorageInformation>,
    canvas: Option<PixelBuffer>,
}

impl PngStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            information: None,
            canvas: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn color_type(layout: PixelLayout) -> Option<ExtendedColorType> {
    let color = match (layout.component, layout.components) {
        (ComponentType::U8, 1) => ExtendedColorType::L8,
        (ComponentType::U8, 2) => ExtendedColorType::La8,
        (ComponentType::U8, 3) => ExtendedColorType::Rgb8,
        (ComponentType::U8, 4) => ExtendedColorType::Rgba8,
        (ComponentType::U16, 1) => ExtendedColorType::L16,
        (ComponentType::U16, 2) => ExtendedColorType::La16,
        (ComponentType::U16, 3) => ExtendedColorType::Rgb16,
        (ComponentType::U16, 4) => ExtendedColorType::Rgba16,
        _ => return None,
    };
    Some(color)
}

impl RasterStorage for PngStorage {
    fn name(&self) -> &str {
        "png"
    }

    fn output_layout(&self, input: PixelLayout) -> PixelLayout {
        match input.component {
            ComponentType::U16 => input,
            _ => PixelLayout::new(ComponentType::U8, input.components),
        }
    }

    fn write_information(&mut self, information: &StorageInformation) -> StorageResult<()> {
        if color_type(information.layout).is_none() {
            return Err(StorageError::UnsupportedLayout {
                backend: "png",
                layout: information.layout,
            });
        }
        self.canvas = Some(PixelBuffer::new(
            information.layout,
            information.region.pixel_count() as usize,
        ));
        self.information = Some(information.clone());
        Ok(())
    }

    fn can_stream_write(&self) -> bool {
        false
    }

    fn write(&mut self, region: &Region, buffer: &PixelBuffer) -> StorageResult<()> {
        let information = self
            .information
            .as_ref()
            .ok_or(StorageError::NotInitialized("png"))?;
        let converted;
        let buffer = if buffer.layout() != information.layout {
            converted = convert_buffer(buffer, information.layout)?;
            &converted
        } else {
            buffer
        };
        check_write(information, region, buffer)?;

        let canvas = self
            .canvas
            .as_mut()
            .ok_or(StorageError::NotInitialized("png"))?;
        canvas.paste(&information.region, buffer, region)?;
        Ok(())
    }

    fn finalize(&mut self) -> StorageResult<()> {
        let information = self
            .information
            .as_ref()
            .ok_or(StorageError::NotInitialized("png"))?;
        let canvas = self
            .canvas
            .take()
            .ok_or(StorageError::NotInitialized("png"))?;
        let color = color_type(information.layout).ok_or(StorageError::UnsupportedLayout {
            backend: "png",
            layout: information.layout,
        })?;

        debug!(
            "Encoding {} as PNG ({})",
            self.path.display(),
            information.region
        );
        image::save_buffer_with_format(
            &self.path,
            canvas.as_bytes(),
            information.region.width() as u32,
            information.region.height() as u32,
            color,
            ImageFormat::Png,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_mapping() {
        let storage = PngStorage::new("x.png");
        assert_eq!(
            storage.output_layout(PixelLayout::new(ComponentType::F32, 3)),
            PixelLayout::new(ComponentType::U8, 3)
        );
        assert_eq!(
            storage.output_layout(PixelLayout::scalar(ComponentType::U16)),
            PixelLayout::scalar(ComponentType::U16)
        );
        assert!(!storage.can_stream_write());
    }

    #[test]
    fn test_too_many_bands_rejected() {
        let mut storage = PngStorage::new("x.png");
        let info = StorageInformation::new(
            Region::from_size([2, 2]),
            PixelLayout::new(ComponentType::U8, 5),
        );
        assert!(matches!(
            storage.write_information(&info),
            Err(StorageError::UnsupportedLayout { .. })
        ));
    }

    #[test]
    fn test_encode_gray() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let layout = PixelLayout::scalar(ComponentType::U8);
        let mut storage = PngStorage::new(&path);
        storage
            .write_information(&StorageInformation::new(Region::from_size([3, 2]), layout))
            .unwrap();
        let pixels = PixelBuffer::from_slice(layout, &[0u8, 50, 100, 150, 200, 250]).unwrap();
        storage.write(&Region::from_size([3, 2]), &pixels).unwrap();
        storage.finalize().unwrap();

        let decoded = image::open(&path).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.into_raw(), vec![0, 50, 100, 150, 200, 250]);
    }
}
