//! Streaming manager: turns a strategy and a pipeline into a partition plan.

use crate::core::error::{NodeId, PipelineResult};
use crate::core::region::{Region, DIMENSION};
use crate::graph::structure::PipelineGraph;
use crate::streaming::config::platform_default_ram_mb;
use crate::streaming::strategy::{StreamingStrategy, MB};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A soft problem met while planning. The run goes on with a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamingWarning {
    /// An option was invalid or meaningless; a default was used instead.
    Configuration { message: String },
    /// The storage cannot take partial writes, so the plan has one partition.
    StorageNotStreamable { storage: String },
    /// A node always produces its whole extent, so the plan has one partition.
    NodeNotStreamable { node_id: NodeId },
    /// The reference node already buffers the region being written.
    AlreadyBuffered { node_id: NodeId },
}

impl StreamingWarning {
    pub fn configuration(message: impl Into<String>) -> Self {
        StreamingWarning::Configuration {
            message: message.into(),
        }
    }
}

impl fmt::Display for StreamingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamingWarning::Configuration { message } => write!(f, "{}", message),
            StreamingWarning::StorageNotStreamable { storage } => write!(
                f,
                "{} cannot stream partial writes, writing a single partition",
                storage
            ),
            StreamingWarning::NodeNotStreamable { node_id } => write!(
                f,
                "node {} cannot produce partial regions, writing a single partition",
                node_id
            ),
            StreamingWarning::AlreadyBuffered { node_id } => write!(
                f,
                "node {} already buffers the written region, writing a single partition",
                node_id
            ),
        }
    }
}

/// What the manager needs to know about one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConstraints {
    pub name: String,
    pub streamable: bool,
    pub block_size: Option<[u64; DIMENSION]>,
}

impl StorageConstraints {
    pub fn new(name: impl Into<String>, streamable: bool) -> Self {
        Self {
            name: name.into(),
            streamable,
            block_size: None,
        }
    }

    pub fn with_block_size(mut self, block_size: Option<[u64; DIMENSION]>) -> Self {
        self.block_size = block_size;
        self
    }
}

/// Ordered partitions covering one region, and how they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingPlan {
    /// Strategy that produced the splits, after zero parameters were resolved.
    pub strategy: StreamingStrategy,
    /// Region being partitioned.
    pub region: Region,
    pub splits: Vec<Region>,
    /// Pipeline bytes per pixel used for RAM estimates.
    pub bytes_per_pixel: u64,
    pub warnings: Vec<StreamingWarning>,
}

impl StreamingPlan {
    pub fn number_of_splits(&self) -> usize {
        self.splits.len()
    }

    pub fn split(&self, index: usize) -> Option<&Region> {
        self.splits.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.splits.iter()
    }

    /// Estimated footprint of the largest partition.
    pub fn max_partition_bytes(&self) -> u64 {
        self.splits
            .iter()
            .map(|r| r.pixel_count() * self.bytes_per_pixel)
            .max()
            .unwrap_or(0)
    }

    /// Whether streaming was disabled by a soft fallback.
    pub fn is_single_partition(&self) -> bool {
        self.splits.len() == 1
    }
}

/// Chooses a strategy and prepares partition plans.
///
/// The last strategy set wins.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingManager {
    strategy: StreamingStrategy,
    default_ram_mb: u64,
}

impl Default for StreamingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingManager {
    /// RAM-adaptive streaming with the platform default budget.
    pub fn new() -> Self {
        Self {
            strategy: StreamingStrategy::default(),
            default_ram_mb: platform_default_ram_mb(),
        }
    }

    pub fn with_strategy(mut self, strategy: StreamingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Budget used wherever a RAM value of 0 is given.
    pub fn with_default_ram(mut self, ram_mb: u64) -> Self {
        self.default_ram_mb = ram_mb.max(1);
        self
    }

    pub fn strategy(&self) -> StreamingStrategy {
        self.strategy
    }

    pub fn default_ram_mb(&self) -> u64 {
        self.default_ram_mb
    }

    pub fn set_default_ram(&mut self, ram_mb: u64) {
        self.default_ram_mb = ram_mb.max(1);
    }

    pub fn set_strategy(&mut self, strategy: StreamingStrategy) {
        self.strategy = strategy;
    }

    pub fn set_number_of_divisions_stripped(&mut self, divisions: u64) {
        self.strategy = StreamingStrategy::NumberOfDivisionsStripped { divisions };
    }

    pub fn set_number_of_divisions_tiled(&mut self, divisions: u64) {
        self.strategy = StreamingStrategy::NumberOfDivisionsTiled { divisions };
    }

    pub fn set_number_of_lines_stripped(&mut self, lines: u64) {
        self.strategy = StreamingStrategy::LinesPerStrip { lines };
    }

    pub fn set_tile_dimension_tiled(&mut self, dimension: u64) {
        self.strategy = StreamingStrategy::TileDimension { dimension };
    }

    pub fn set_automatic_stripped(&mut self, ram_mb: u64, bias: f64) {
        self.strategy = StreamingStrategy::RamStripped { ram_mb, bias };
    }

    pub fn set_automatic_tiled(&mut self, ram_mb: u64, bias: f64) {
        self.strategy = StreamingStrategy::RamTiled { ram_mb, bias };
    }

    pub fn set_automatic_adaptive(&mut self, ram_mb: u64, bias: f64) {
        self.strategy = StreamingStrategy::RamAdaptive { ram_mb, bias };
    }

    /// Replace zero sizes and invalid biases, warning about each.
    pub fn resolve(&self) -> (StreamingStrategy, Vec<StreamingWarning>) {
        let mut warnings = Vec::new();
        let mut zero = |what: &str| {
            warnings.push(StreamingWarning::configuration(format!(
                "{} of 0 is probably unintended, using the default RAM budget of {} MB",
                what, self.default_ram_mb
            )));
        };

        let resolved = match self.strategy {
            StreamingStrategy::NumberOfDivisionsStripped { divisions: 0 } => {
                zero("number of divisions");
                StreamingStrategy::RamStripped { ram_mb: 0, bias: 1.0 }
            }
            StreamingStrategy::NumberOfDivisionsTiled { divisions: 0 } => {
                zero("number of divisions");
                StreamingStrategy::RamTiled { ram_mb: 0, bias: 1.0 }
            }
            StreamingStrategy::LinesPerStrip { lines: 0 } => {
                zero("number of lines per strip");
                StreamingStrategy::RamStripped { ram_mb: 0, bias: 1.0 }
            }
            StreamingStrategy::TileDimension { dimension: 0 } => {
                zero("tile dimension");
                StreamingStrategy::RamTiled { ram_mb: 0, bias: 1.0 }
            }
            other => other,
        };

        let resolved = match resolved {
            StreamingStrategy::RamStripped { ram_mb, bias }
            | StreamingStrategy::RamTiled { ram_mb, bias }
            | StreamingStrategy::RamAdaptive { ram_mb, bias }
                if !(bias >= 1.0) =>
            {
                warnings.push(StreamingWarning::configuration(format!(
                    "bias {} is below 1.0, using 1.0",
                    bias
                )));
                with_budget(resolved, ram_mb, 1.0)
            }
            other => other,
        };

        (resolved, warnings)
    }

    /// Build the partition plan for writing `region` of `roots[0]`.
    ///
    /// The first root is the reference node; the bytes-per-pixel estimate
    /// covers every node upstream of any root. Output information must be
    /// up to date.
    pub fn prepare_streaming(
        &self,
        graph: &PipelineGraph,
        roots: &[NodeId],
        region: Region,
        storages: &[StorageConstraints],
    ) -> PipelineResult<StreamingPlan> {
        let (strategy, mut warnings) = self.resolve();
        let bytes_per_pixel = graph.pipeline_bytes_per_pixel(roots)?;

        for storage in storages.iter().filter(|s| !s.streamable) {
            warnings.push(StreamingWarning::StorageNotStreamable {
                storage: storage.name.clone(),
            });
        }
        for node_id in graph.non_streamable_nodes(roots)? {
            warnings.push(StreamingWarning::NodeNotStreamable { node_id });
        }
        if let Some(&reference) = roots.first() {
            let buffered = graph.buffered_region(reference)?;
            if !region.is_empty() && buffered.contains(&region) {
                warnings.push(StreamingWarning::AlreadyBuffered { node_id: reference });
            }
        }

        let single = warnings.iter().any(|w| {
            !matches!(w, StreamingWarning::Configuration { .. })
        });
        let splits = if single {
            vec![region]
        } else {
            let block_size = storages
                .iter()
                .find_map(|s| s.block_size)
                .or(match roots.first() {
                    Some(&reference) => graph.information(reference)?.block_size,
                    None => None,
                });
            strategy.split(&region, bytes_per_pixel, block_size, self.default_ram_mb)
        };

        for warning in &warnings {
            warn!("{}", warning);
        }
        let first = splits.first().copied().unwrap_or_default();
        info!(
            "Streaming {} with {}: {} blocks of {}x{} pixels (~{:.1} MB each, {} bytes/pixel)",
            region,
            strategy,
            splits.len(),
            first.width(),
            first.height(),
            (first.pixel_count() * bytes_per_pixel) as f64 / MB as f64,
            bytes_per_pixel
        );

        Ok(StreamingPlan {
            strategy,
            region,
            splits,
            bytes_per_pixel,
            warnings,
        })
    }
}

fn with_budget(strategy: StreamingStrategy, ram_mb: u64, bias: f64) -> StreamingStrategy {
    match strategy {
        StreamingStrategy::RamStripped { .. } => StreamingStrategy::RamStripped { ram_mb, bias },
        StreamingStrategy::RamTiled { .. } => StreamingStrategy::RamTiled { ram_mb, bias },
        StreamingStrategy::RamAdaptive { .. } => StreamingStrategy::RamAdaptive { ram_mb, bias },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::PixelBuffer;
    use crate::core::types::{ComponentType, PixelLayout};
    use crate::filters::{ConstantSource, GradientSource, LinearTransform, MemorySource};

    fn big_float_source(graph: &mut PipelineGraph) -> NodeId {
        let src = graph.add(GradientSource::new([10_000, 10_000], ComponentType::F32));
        graph.update_output_information(src).unwrap();
        src
    }

    fn streamable() -> StorageConstraints {
        StorageConstraints::new("memory", true)
    }

    #[test]
    fn test_ram_budget_scenario() {
        let mut graph = PipelineGraph::new();
        let src = big_float_source(&mut graph);
        let mut manager = StreamingManager::new();
        manager.set_automatic_tiled(64, 1.0);

        let region = graph.largest_region(src).unwrap();
        let plan = manager
            .prepare_streaming(&graph, &[src], region, &[streamable()])
            .unwrap();
        assert!(plan.number_of_splits() > 1);
        assert!(plan.max_partition_bytes() <= 64 * MB);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_non_streamable_storage_forces_single_partition() {
        let mut graph = PipelineGraph::new();
        let src = big_float_source(&mut graph);
        let mut manager = StreamingManager::new();
        manager.set_number_of_lines_stripped(10);

        let region = graph.largest_region(src).unwrap();
        let plan = manager
            .prepare_streaming(&graph, &[src], region, &[StorageConstraints::new("png", false)])
            .unwrap();
        assert_eq!(plan.splits, vec![region]);
        assert_eq!(
            plan.warnings,
            vec![StreamingWarning::StorageNotStreamable {
                storage: "png".into()
            }]
        );
    }

    #[test]
    fn test_whole_extent_node_forces_single_partition() {
        let layout = PixelLayout::scalar(ComponentType::U8);
        let mut graph = PipelineGraph::new();
        let src = graph.add(
            MemorySource::new([4, 4], PixelBuffer::new(layout, 16))
                .unwrap()
                .whole_extent_only(),
        );
        let gain = graph.add(LinearTransform::new(2.0, 0.0));
        graph.connect(src, gain, 0).unwrap();
        graph.update_output_information(gain).unwrap();

        let mut manager = StreamingManager::new();
        manager.set_number_of_divisions_stripped(4);
        let plan = manager
            .prepare_streaming(&graph, &[gain], Region::from_size([4, 4]), &[streamable()])
            .unwrap();
        assert_eq!(plan.number_of_splits(), 1);
        assert_eq!(plan.warnings, vec![StreamingWarning::NodeNotStreamable { node_id: src }]);
    }

    #[test]
    fn test_already_buffered_reference() {
        let mut graph = PipelineGraph::new();
        let src = graph.add(ConstantSource::new(
            [32, 32],
            PixelLayout::scalar(ComponentType::U8),
            1.0,
        ));
        let region = graph.update_output_information(src).unwrap().largest_region;
        graph.set_requested_region(src, region).unwrap();
        graph.propagate_requested_region(src).unwrap();
        graph.update_data(&[src], None).unwrap();

        let mut manager = StreamingManager::new();
        manager.set_number_of_divisions_stripped(8);
        let plan = manager
            .prepare_streaming(&graph, &[src], region, &[streamable()])
            .unwrap();
        assert_eq!(plan.number_of_splits(), 1);
        assert!(matches!(plan.warnings[0], StreamingWarning::AlreadyBuffered { .. }));
    }

    #[test]
    fn test_already_buffered_compares_the_written_region() {
        let mut graph = PipelineGraph::new();
        let src = graph.add(ConstantSource::new(
            [32, 32],
            PixelLayout::scalar(ComponentType::U8),
            1.0,
        ));
        let extent = graph.update_output_information(src).unwrap().largest_region;
        let boxed = Region::new([4, 4], [8, 8]);
        graph.set_requested_region(src, boxed).unwrap();
        graph.propagate_requested_region(src).unwrap();
        graph.update_data(&[src], None).unwrap();

        let mut manager = StreamingManager::new();
        manager.set_number_of_divisions_stripped(4);
        let plan = manager
            .prepare_streaming(&graph, &[src], boxed, &[streamable()])
            .unwrap();
        assert_eq!(plan.splits, vec![boxed]);

        let plan = manager
            .prepare_streaming(&graph, &[src], extent, &[streamable()])
            .unwrap();
        assert_eq!(plan.number_of_splits(), 4);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_zero_size_falls_back_to_ram() {
        let mut manager = StreamingManager::new().with_default_ram(8);
        manager.set_tile_dimension_tiled(0);
        let (resolved, warnings) = manager.resolve();
        assert_eq!(resolved, StreamingStrategy::RamTiled { ram_mb: 0, bias: 1.0 });
        assert_eq!(warnings.len(), 1);

        let mut graph = PipelineGraph::new();
        let src = big_float_source(&mut graph);
        let plan = manager
            .prepare_streaming(&graph, &[src], Region::from_size([10_000, 10_000]), &[streamable()])
            .unwrap();
        assert!(plan.number_of_splits() > 1);
        assert!(plan.max_partition_bytes() <= 8 * MB);
    }

    #[test]
    fn test_low_bias_is_clamped() {
        let mut manager = StreamingManager::new();
        manager.set_automatic_stripped(32, 0.5);
        let (resolved, warnings) = manager.resolve();
        assert_eq!(resolved, StreamingStrategy::RamStripped { ram_mb: 32, bias: 1.0 });
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_last_strategy_wins() {
        let mut manager = StreamingManager::new();
        manager.set_number_of_divisions_tiled(4);
        manager.set_number_of_lines_stripped(16);
        assert_eq!(manager.strategy(), StreamingStrategy::LinesPerStrip { lines: 16 });
    }

    #[test]
    fn test_adaptive_uses_storage_blocks() {
        let mut graph = PipelineGraph::new();
        let src = graph.add(GradientSource::new([1000, 1000], ComponentType::U8).with_block_size([100, 100]));
        graph.update_output_information(src).unwrap();
        let mut manager = StreamingManager::new();
        manager.set_automatic_adaptive(1, 1.0);
        let region = Region::from_size([1000, 1000]);

        let storage = streamable().with_block_size(Some([1000, 1]));
        let plan = manager.prepare_streaming(&graph, &[src], region, &[storage]).unwrap();
        assert_eq!(plan.splits[0].width(), 1000);

        let plan = manager.prepare_streaming(&graph, &[src], region, &[streamable()]).unwrap();
        assert!(plan.iter().all(|r| r.index[0] % 100 == 0 && r.index[1] % 100 == 0));
    }
}
