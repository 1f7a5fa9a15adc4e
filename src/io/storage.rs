//! The storage contract used by the streaming writers.

use crate::core::buffer::PixelBuffer;
use crate::core::error::StorageResult;
use crate::core::region::{Region, DIMENSION};
use crate::core::types::{MetadataSnapshot, PixelLayout};
use serde::{Deserialize, Serialize};

/// Header information written before any pixel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInformation {
    /// Stored extent. Writes use coordinates relative to this region.
    pub region: Region,
    /// Layout of the buffers passed to [`RasterStorage::write`].
    pub layout: PixelLayout,
    pub metadata: MetadataSnapshot,
}

impl StorageInformation {
    pub fn new(region: Region, layout: PixelLayout) -> Self {
        Self {
            region,
            layout,
            metadata: MetadataSnapshot::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataSnapshot) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A persisted raster destination.
///
/// Call order: [`write_information`](Self::write_information) once, then
/// [`write`](Self::write) once per partition in plan order, then
/// [`finalize`](Self::finalize) once after the last partition (not after an
/// aborted run).
pub trait RasterStorage: Send {
    /// Short backend name used in logs and warnings.
    fn name(&self) -> &str;

    /// Layout this storage keeps for buffers arriving in `input` layout.
    ///
    /// The writers convert buffers to it before calling `write`.
    fn output_layout(&self, input: PixelLayout) -> PixelLayout {
        input
    }

    /// Write the header. No pixel data is touched.
    fn write_information(&mut self, information: &StorageInformation) -> StorageResult<()>;

    /// Whether partial regions can be written one at a time.
    fn can_stream_write(&self) -> bool;

    /// Native block grid of the stored data, if any.
    fn block_size(&self) -> Option<[u64; DIMENSION]> {
        None
    }

    /// Write `buffer`, covering exactly `region`, at the matching location.
    fn write(&mut self, region: &Region, buffer: &PixelBuffer) -> StorageResult<()>;

    /// Flush everything once the last partition has been written.
    fn finalize(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

/// Check that a write fits the header and carries the right layout.
pub(crate) fn check_write(
    information: &StorageInformation,
    region: &Region,
    buffer: &PixelBuffer,
) -> StorageResult<()> {
    use crate::core::error::{BufferError, StorageError};

    if !information.region.contains(region) || region.is_empty() {
        return Err(StorageError::OutOfBounds {
            region: *region,
            bounds: information.region,
        });
    }
    if buffer.layout() != information.layout {
        return Err(BufferError::LayoutMismatch {
            expected: information.layout,
            got: buffer.layout(),
        }
        .into());
    }
    if buffer.pixel_count() as u64 != region.pixel_count() {
        return Err(BufferError::Length {
            expected: region.pixel_count() as usize * information.layout.bytes_per_pixel(),
            got: buffer.as_bytes().len(),
        }
        .into());
    }
    Ok(())
}
