//! In-memory storage, mostly useful for tests and for chaining writes.

use crate::core::buffer::PixelBuffer;
use crate::core::convert::convert_buffer;
use crate::core::error::{StorageError, StorageResult};
use crate::core::region::{Region, DIMENSION};
use crate::core::types::{ComponentType, PixelLayout};
use crate::io::storage::{check_write, RasterStorage, StorageInformation};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryContents {
    information: Option<StorageInformation>,
    buffer: Option<PixelBuffer>,
    writes: Vec<Region>,
    finalized: bool,
}

/// Storage that keeps the whole raster in a shared buffer.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    contents: Arc<Mutex<MemoryContents>>,
    streamable: bool,
    block_size: Option<[u64; DIMENSION]>,
    component: Option<ComponentType>,
}

/// Read-side handle on a [`MemoryStorage`], usable after the storage has
/// been moved into a writer.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    contents: Arc<Mutex<MemoryContents>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            contents: Arc::new(Mutex::new(MemoryContents::default())),
            streamable: true,
            block_size: None,
            component: None,
        }
    }

    /// Refuse partial writes, like single-shot encoders do.
    pub fn non_streamable(mut self) -> Self {
        self.streamable = false;
        self
    }

    pub fn with_block_size(mut self, block_size: [u64; DIMENSION]) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn with_component_type(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            contents: Arc::clone(&self.contents),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHandle {
    /// Copy of the stored raster, once the header has been written.
    pub fn buffer(&self) -> Option<PixelBuffer> {
        self.contents.lock().buffer.clone()
    }

    pub fn information(&self) -> Option<StorageInformation> {
        self.contents.lock().information.clone()
    }

    /// Regions passed to `write`, in call order.
    pub fn writes(&self) -> Vec<Region> {
        self.contents.lock().writes.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.contents.lock().finalized
    }
}

impl RasterStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn output_layout(&self, input: PixelLayout) -> PixelLayout {
        match self.component {
            Some(component) => PixelLayout::new(component, input.components),
            None => input,
        }
    }

    fn write_information(&mut self, information: &StorageInformation) -> StorageResult<()> {
        let mut contents = self.contents.lock();
        contents.buffer = Some(PixelBuffer::new(
            information.layout,
            information.region.pixel_count() as usize,
        ));
        contents.information = Some(information.clone());
        contents.writes.clear();
        contents.finalized = false;
        Ok(())
    }

    fn can_stream_write(&self) -> bool {
        self.streamable
    }

    fn block_size(&self) -> Option<[u64; DIMENSION]> {
        self.block_size
    }

    fn write(&mut self, region: &Region, buffer: &PixelBuffer) -> StorageResult<()> {
        let mut contents = self.contents.lock();
        let information = contents
            .information
            .clone()
            .ok_or(StorageError::NotInitialized("memory"))?;
        let converted;
        let buffer = if buffer.layout() != information.layout {
            converted = convert_buffer(buffer, information.layout)?;
            &converted
        } else {
            buffer
        };
        check_write(&information, region, buffer)?;

        let target = contents
            .buffer
            .as_mut()
            .ok_or(StorageError::NotInitialized("memory"))?;
        target.paste(&information.region, buffer, region)?;
        contents.writes.push(*region);
        Ok(())
    }

    fn finalize(&mut self) -> StorageResult<()> {
        self.contents.lock().finalized = true;
        Ok(())
    }
}
