//! Execution module.
//!
//! Drives pipelines into storages partition by partition.

pub mod progress;
pub mod writer;
pub mod multi_writer;

pub use progress::{progress_channel, CancellationToken, ProgressCallback, ProgressTracker, ProgressUpdate};
pub use writer::{ImageWriter, WriteSummary, WriterState};
pub use multi_writer::MultiImageWriter;
