//! Headerless raw raster files with a JSON sidecar.
//!
//! Pixels are stored band-interleaved-by-pixel, row-major, in native byte
//! order. `<path>.json` describes the extent, layout and metadata.

use crate::core::buffer::PixelBuffer;
use crate::core::convert::convert_buffer;
use crate::core::error::{StorageError, StorageResult};
use crate::core::region::{Region, DIMENSION};
use crate::core::types::{ComponentType, PixelLayout};
use crate::io::storage::{check_write, RasterStorage, StorageInformation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Contents of the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    pub width: u64,
    pub height: u64,
    pub component: ComponentType,
    pub components: usize,
    pub byte_order: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RawHeader {
    pub fn layout(&self) -> PixelLayout {
        PixelLayout::new(self.component, self.components)
    }
}

fn native_byte_order() -> &'static str {
    if cfg!(target_endian = "little") {
        "little"
    } else {
        "big"
    }
}

/// Sidecar path of a raw file.
pub fn header_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Streamable raw file storage.
pub struct RawFileStorage {
    path: PathBuf,
    component: Option<ComponentType>,
    information: Option<StorageInformation>,
    file: Option<File>,
}

impl RawFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            component: None,
            information: None,
            file: None,
        }
    }

    /// Store components as `component`, converting on the way in.
    pub fn with_component_type(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back a raw file and its sidecar.
    pub fn read(path: impl AsRef<Path>) -> StorageResult<(RawHeader, PixelBuffer)> {
        let path = path.as_ref();
        let header: RawHeader = serde_json::from_slice(&std::fs::read(header_path(path))?)?;
        let data = std::fs::read(path)?;
        let pixels = (header.width * header.height) as usize;
        let buffer = PixelBuffer::from_bytes(header.layout(), pixels, data)?;
        Ok((header, buffer))
    }

    fn information(&self) -> StorageResult<&StorageInformation> {
        self.information
            .as_ref()
            .ok_or(StorageError::NotInitialized("raw"))
    }
}

impl RasterStorage for RawFileStorage {
    fn name(&self) -> &str {
        "raw"
    }

    fn output_layout(&self, input: PixelLayout) -> PixelLayout {
        match self.component {
            Some(component) => PixelLayout::new(component, input.components),
            None => input,
        }
    }

    fn write_information(&mut self, information: &StorageInformation) -> StorageResult<()> {
        let header = RawHeader {
            width: information.region.width(),
            height: information.region.height(),
            component: information.layout.component,
            components: information.layout.components,
            byte_order: native_byte_order().to_string(),
            metadata: information
                .metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        std::fs::write(header_path(&self.path), serde_json::to_vec_pretty(&header)?)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.set_len(information.region.pixel_count() * information.layout.bytes_per_pixel() as u64)?;
        debug!(
            "Raw file {} sized for {} ({})",
            self.path.display(),
            information.region,
            information.layout
        );

        self.file = Some(file);
        self.information = Some(information.clone());
        Ok(())
    }

    fn can_stream_write(&self) -> bool {
        true
    }

    fn block_size(&self) -> Option<[u64; DIMENSION]> {
        self.information
            .as_ref()
            .map(|info| [info.region.width().max(1), 1])
    }

    fn write(&mut self, region: &Region, buffer: &PixelBuffer) -> StorageResult<()> {
        let information = self.information()?.clone();
        let converted;
        let buffer = if buffer.layout() != information.layout {
            converted = convert_buffer(buffer, information.layout)?;
            &converted
        } else {
            buffer
        };
        check_write(&information, region, buffer)?;

        let bounds = information.region;
        let bpp = information.layout.bytes_per_pixel() as u64;
        let row_bytes = (region.width() * bpp) as usize;
        let file = self
            .file
            .as_mut()
            .ok_or(StorageError::NotInitialized("raw"))?;

        for (row, chunk) in buffer.as_bytes().chunks_exact(row_bytes.max(1)).enumerate() {
            let y = (region.index[1] - bounds.index[1]) as u64 + row as u64;
            let x = (region.index[0] - bounds.index[0]) as u64;
            file.seek(SeekFrom::Start((y * bounds.width() + x) * bpp))?;
            file.write_all(chunk)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> StorageResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MetadataSnapshot;
    use tempfile::tempdir;

    #[test]
    fn test_rows_land_at_their_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.raw");
        let layout = PixelLayout::scalar(ComponentType::U8);
        let mut storage = RawFileStorage::new(&path);
        storage
            .write_information(
                &StorageInformation::new(Region::from_size([4, 3]), layout)
                    .with_metadata(MetadataSnapshot::new().with("source", "test")),
            )
            .unwrap();
        assert_eq!(storage.block_size(), Some([4, 1]));

        let bottom = PixelBuffer::from_slice(layout, &[9u8, 9, 9, 9]).unwrap();
        storage.write(&Region::new([0, 2], [4, 1]), &bottom).unwrap();
        let corner = PixelBuffer::from_slice(layout, &[1u8, 2, 3, 4]).unwrap();
        storage.write(&Region::new([1, 0], [2, 2]), &corner).unwrap();
        storage.finalize().unwrap();

        let (header, buffer) = RawFileStorage::read(&path).unwrap();
        assert_eq!(header.metadata.get("source").map(String::as_str), Some("test"));
        assert_eq!(
            buffer.to_vec::<u8>(),
            vec![0, 1, 2, 0, 0, 3, 4, 0, 9, 9, 9, 9]
        );
    }

    #[test]
    fn test_forced_component_type_converts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.raw");
        let mut storage = RawFileStorage::new(&path).with_component_type(ComponentType::F64);
        let input = PixelLayout::new(ComponentType::U16, 2);
        let stored = storage.output_layout(input);
        assert_eq!(stored, PixelLayout::new(ComponentType::F64, 2));

        storage
            .write_information(&StorageInformation::new(Region::from_size([1, 1]), stored))
            .unwrap();
        let pixel = PixelBuffer::from_slice(input, &[7u16, 8]).unwrap();
        storage.write(&Region::from_size([1, 1]), &pixel).unwrap();
        storage.finalize().unwrap();

        let (header, buffer) = RawFileStorage::read(&path).unwrap();
        assert_eq!(header.component, ComponentType::F64);
        assert_eq!(buffer.to_vec::<f64>(), vec![7.0, 8.0]);
    }

    #[test]
    fn test_write_outside_extent_fails() {
        let dir = tempdir().unwrap();
        let layout = PixelLayout::scalar(ComponentType::U8);
        let mut storage = RawFileStorage::new(dir.path().join("out.raw"));
        let piece = PixelBuffer::new(layout, 4);
        assert!(matches!(
            storage.write(&Region::from_size([2, 2]), &piece),
            Err(StorageError::NotInitialized(_))
        ));

        storage
            .write_information(&StorageInformation::new(Region::from_size([2, 2]), layout))
            .unwrap();
        assert!(matches!(
            storage.write(&Region::new([1, 1], [2, 2]), &piece),
            Err(StorageError::OutOfBounds { .. })
        ));
    }
}
