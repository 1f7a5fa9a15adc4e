//! Storage backends and everything needed to pick one from a filename.

pub mod storage;
pub mod raw;
pub mod memory;
pub mod png;
pub mod registry;
pub mod filename;

pub use storage::{RasterStorage, StorageInformation};
pub use raw::{RawFileStorage, RawHeader};
pub use memory::{MemoryHandle, MemoryStorage};
pub use png::PngStorage;
pub use registry::{create_storage, initialize_global, shutdown_global, StorageRegistry};
pub use filename::ExtendedFilename;
