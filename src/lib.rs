//! # Strata - Out-of-core Raster Streaming
//!
//! Strata writes rasters that do not fit in memory. A pipeline of nodes is
//! evaluated on demand, one partition at a time, and each partition is handed
//! to a storage backend before the next one is computed.
//!
//! ## Features
//!
//! - **Demand-driven graph**: nodes only produce the region their consumers ask for
//! - **Streaming strategies**: fixed counts, strips, tiles, or RAM budgets snapped to storage blocks
//! - **Multi-output writes**: several storages fed from one partition plan
//! - **Pixel conversion**: table-driven conversion between scalar and complex types
//! - **Pluggable storage**: raw files, PNG, in-memory, or your own [`io::RasterStorage`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! let mut graph = PipelineGraph::new();
//! let source = graph.add(GradientSource::new([20_000, 20_000], ComponentType::F32));
//! let gain = graph.add(LinearTransform::new(0.5, 10.0));
//! graph.connect(source, gain, 0)?;
//!
//! let mut writer = ImageWriter::new()
//!     .with_input(gain)
//!     .with_storage(RawFileStorage::new("out.raw"));
//! writer.streaming_manager_mut().set_automatic_tiled(128, 1.0);
//! let summary = writer.write(&mut graph)?;
//! println!("{} partitions", summary.partitions_written);
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: regions, pixel types, buffers, the converter, the node trait and errors
//! - [`graph`]: the node arena and the three pipeline passes
//! - [`streaming`]: strategies, the streaming manager and its options
//! - [`execution`]: single and multi-output writers, progress and cancellation
//! - [`io`]: storage contract, backends, registry and extended filenames
//! - [`filters`]: ready-made nodes

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;
pub mod io;
pub mod streaming;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::buffer::PixelBuffer;
    pub use crate::core::region::Region;
    pub use crate::core::types::{ComponentType, MetadataSnapshot, OutputInformation, PixelLayout};

    // Node trait and context
    pub use crate::core::context::GenerateContext;
    pub use crate::core::node::{FilterMetadata, RasterFilter, RegionPolicy};

    // Errors
    pub use crate::core::error::{
        ConversionError, NodeId, PipelineError, PipelineResult, StorageError, StrataError,
        StrataResult, WriteError,
    };

    // Graph
    pub use crate::graph::{GraphNode, PipelineGraph};

    // Streaming
    pub use crate::streaming::{
        StreamingManager, StreamingOptions, StreamingPlan, StreamingStrategy, StreamingWarning,
    };

    // Execution
    pub use crate::execution::{
        progress_channel, CancellationToken, ImageWriter, MultiImageWriter, ProgressUpdate,
        WriteSummary,
    };

    // Storage
    pub use crate::io::{
        ExtendedFilename, MemoryStorage, PngStorage, RasterStorage, RawFileStorage,
        StorageRegistry,
    };

    // Filters
    pub use crate::filters::{
        BandStack, BoxMean, CastFilter, ConstantSource, GradientSource, LinearTransform,
        MemorySource,
    };
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::execution::progress::ProgressCallback;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "strata");
    }

    fn pipeline(size: [u64; 2]) -> (PipelineGraph, NodeId) {
        let mut graph = PipelineGraph::new();
        let source = graph.add(GradientSource::new(size, ComponentType::F32));
        let gain = graph.add(LinearTransform::new(0.5, 3.0));
        graph.connect(source, gain, 0).unwrap();
        (graph, gain)
    }

    #[test]
    fn test_raw_output_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut outputs = Vec::new();
        for name in ["first.raw", "second.raw"] {
            let path = dir.path().join(name);
            let (mut graph, root) = pipeline([300, 200]);
            let mut writer = ImageWriter::new()
                .with_input(root)
                .with_storage(RawFileStorage::new(&path));
            writer.streaming_manager_mut().set_tile_dimension_tiled(64);
            let summary = writer.write(&mut graph).unwrap();
            assert_eq!(summary.partitions_written, 20);
            outputs.push(std::fs::read(&path).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);

        let (header, buffer) = RawFileStorage::read(dir.path().join("first.raw")).unwrap();
        assert_eq!((header.width, header.height), (300, 200));
        let values = buffer.to_vec::<f32>();
        assert_eq!(values[0], 3.0);
        assert_eq!(values[301], 0.5 * 301.0 + 3.0);
    }

    #[test]
    fn test_streamed_matches_single_partition() {
        let single = {
            let (mut graph, root) = pipeline([64, 48]);
            let storage = MemoryStorage::new();
            let handle = storage.handle();
            let mut writer = ImageWriter::new().with_input(root).with_storage(storage);
            writer.streaming_manager_mut().set_number_of_divisions_stripped(1);
            writer.write(&mut graph).unwrap();
            handle.buffer().unwrap()
        };
        let streamed = {
            let (mut graph, root) = pipeline([64, 48]);
            let storage = MemoryStorage::new();
            let handle = storage.handle();
            let mut writer = ImageWriter::new().with_input(root).with_storage(storage);
            writer.streaming_manager_mut().set_number_of_divisions_tiled(7);
            let summary = writer.write(&mut graph).unwrap();
            assert!(summary.partitions_written > 1);
            handle.buffer().unwrap()
        };
        assert_eq!(single, streamed);
    }

    #[test]
    fn test_multi_writer_different_types_same_boundaries() {
        let mut graph = PipelineGraph::new();
        let source = graph.add(GradientSource::new([40, 30], ComponentType::U16));
        let as_float = graph.add(CastFilter::new(PixelLayout::scalar(ComponentType::F64)));
        let as_complex = graph.add(CastFilter::new(PixelLayout::scalar(ComponentType::CF32)));
        graph.connect(source, as_float, 0).unwrap();
        graph.connect(source, as_complex, 0).unwrap();

        let float_storage = MemoryStorage::new();
        let complex_storage = MemoryStorage::new();
        let (f, c) = (float_storage.handle(), complex_storage.handle());
        let mut writer = MultiImageWriter::new();
        writer.add_output(as_float, float_storage);
        writer.add_output(as_complex, complex_storage);
        assert_eq!(writer.output_count(), 2);
        writer.streaming_manager_mut().set_number_of_lines_stripped(7);
        let summary = writer.write(&mut graph).unwrap();

        assert_eq!(summary.plan.number_of_splits(), 5);
        assert_eq!(f.writes(), c.writes());
        let floats = f.buffer().unwrap().to_vec::<f64>();
        let complex = c.buffer().unwrap().to_vec::<f32>();
        assert_eq!(floats[41], 41.0);
        assert_eq!(complex[82..84], [41.0f32, 0.0]);
    }

    #[test]
    fn test_cancellation_mid_write() {
        let (mut graph, root) = pipeline([32, 32]);
        let storage = MemoryStorage::new();
        let handle = storage.handle();
        let mut writer = ImageWriter::new().with_input(root).with_storage(storage);
        writer.streaming_manager_mut().set_number_of_lines_stripped(4);

        let token = writer.cancellation_token();
        let callback: ProgressCallback = Arc::new(move |update| {
            if let ProgressUpdate::PartitionCompleted { index: 2, .. } = update {
                token.cancel();
            }
        });
        writer.set_progress_callback(Some(callback));

        let err = writer.write(&mut graph).unwrap_err();
        assert!(matches!(
            err,
            StrataError::Write(WriteError::Aborted { completed: 3, total: 8 })
        ));
        // The partition in flight finished; nothing after it was written.
        assert_eq!(handle.writes().len(), 3);
        assert!(!handle.is_finalized());
    }

    #[test]
    fn test_progress_is_monotonic_and_completes_once() {
        let (mut graph, root) = pipeline([50, 50]);
        let (callback, receiver) = progress_channel();
        let mut writer = ImageWriter::new()
            .with_input(root)
            .with_storage(MemoryStorage::new())
            .with_progress_callback(callback);
        writer.streaming_manager_mut().set_number_of_divisions_stripped(5);
        writer.write(&mut graph).unwrap();

        let fractions: Vec<f64> = receiver
            .try_iter()
            .filter_map(|u| match u {
                ProgressUpdate::Progress { fraction, .. } => Some(fraction),
                _ => None,
            })
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.iter().filter(|&&f| f == 1.0).count(), 1);
        assert_eq!(fractions.last(), Some(&1.0));
        // The root reports progress inside partitions.
        assert!(fractions.contains(&0.05));
    }

    #[test]
    fn test_png_forces_single_partition() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut graph = PipelineGraph::new();
        let source = graph.add(GradientSource::new([16, 16], ComponentType::U8));

        let mut writer = ImageWriter::new()
            .with_input(source)
            .with_storage(PngStorage::new(&path));
        writer.streaming_manager_mut().set_number_of_divisions_stripped(4);
        let summary = writer.write(&mut graph).unwrap();

        assert_eq!(summary.partitions_written, 1);
        assert!(summary.plan.is_single_partition());
        assert!(summary
            .warnings
            .iter()
            .any(|w| matches!(w, StreamingWarning::StorageNotStreamable { .. })));
        let decoded = image::open(&path).unwrap().to_luma8();
        assert_eq!(decoded.get_pixel(3, 1).0, [19]);
    }

    #[test]
    fn test_lossless_roundtrip_through_raw() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roundtrip.raw");
        let layout = PixelLayout::new(ComponentType::I32, 2);
        let samples: Vec<i32> = (0..2 * 12 * 5).map(|v| v * 7919 - 50_000).collect();
        let original = PixelBuffer::from_slice(layout, &samples).unwrap();

        let mut graph = PipelineGraph::new();
        let source = graph.add(MemorySource::new([12, 5], original.clone()).unwrap());
        let mut writer = ImageWriter::new()
            .with_input(source)
            .with_storage(RawFileStorage::new(&path).with_component_type(ComponentType::F64));
        writer.streaming_manager_mut().set_number_of_lines_stripped(2);
        writer.write(&mut graph).unwrap();

        let (_, stored) = RawFileStorage::read(&path).unwrap();
        let back = crate::core::convert::convert_buffer(&stored, layout).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_extended_filename_through_registry() {
        let dir = tempdir().unwrap();
        let registry = StorageRegistry::with_builtins();
        let filename = format!(
            "{}?&streaming:type=stripped&streaming:sizemode=height&streaming:sizevalue=3&box=2:2:6:5&bands=1",
            dir.path().join("boxed.raw").display()
        );
        let parsed = ExtendedFilename::parse(&filename).unwrap();
        let storage = registry.create(&parsed.path).unwrap();

        let (mut graph, root) = pipeline([10, 10]);
        let mut writer = ImageWriter::new().with_input(root).with_boxed_storage(storage);
        writer.apply_extended_filename(&parsed);
        let summary = writer.write(&mut graph).unwrap();
        assert_eq!(summary.partitions_written, 2);

        let (header, buffer) = RawFileStorage::read(&parsed.path).unwrap();
        assert_eq!((header.width, header.height), (6, 5));
        assert_eq!(buffer.to_vec::<f32>()[0], 0.5 * 22.0 + 3.0);
    }
}
