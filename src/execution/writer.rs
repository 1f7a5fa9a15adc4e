//! Streaming writer: drives one node into one storage, partition by partition.

use crate::core::buffer::PixelBuffer;
use crate::core::convert::{convert_buffer, lookup};
use crate::core::error::{ConversionError, NodeId, StrataResult, WriteError};
use crate::core::region::Region;
use crate::core::types::PixelLayout;
use crate::execution::progress::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::graph::structure::PipelineGraph;
use crate::io::filename::ExtendedFilename;
use crate::io::registry::create_storage;
use crate::io::storage::{RasterStorage, StorageInformation};
use crate::streaming::{StorageConstraints, StreamingManager, StreamingOptions, StreamingPlan, StreamingWarning};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::Instant;

/// Writer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriterState {
    Idle,
    Preparing,
    Iterating,
    Done,
    Aborted,
}

/// Outcome of a completed write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub plan: StreamingPlan,
    pub partitions_written: usize,
    pub duration_ms: u64,
    /// Configuration warnings followed by the plan's warnings.
    pub warnings: Vec<StreamingWarning>,
}

/// One node bound to one storage, checked and announced to the storage.
#[derive(Debug, Clone)]
pub(crate) struct PreparedOutput {
    pub node: NodeId,
    /// Region of the node that ends up in the storage.
    pub region: Region,
    bands: Option<Vec<usize>>,
    /// Layout handed to the storage.
    layout: PixelLayout,
}

impl PreparedOutput {
    /// Compute the node's information, validate box and bands, and write the
    /// storage header.
    pub(crate) fn prepare(
        graph: &mut PipelineGraph,
        node: NodeId,
        storage: &mut dyn RasterStorage,
        box_region: Option<Region>,
        bands: Option<&[usize]>,
    ) -> StrataResult<Self> {
        let information = graph.update_output_information(node)?;
        let region = match box_region {
            Some(requested) => requested
                .crop(&information.largest_region)
                .map_err(WriteError::from)?,
            None => information.largest_region,
        };

        let components = information.layout.components;
        let selected = match bands {
            Some([]) => return Err(WriteError::InvalidBands { band: 0, components }.into()),
            Some(bands) => {
                if let Some(&band) = bands.iter().find(|&&b| b >= components) {
                    return Err(WriteError::InvalidBands {
                        band: band + 1,
                        components,
                    }
                    .into());
                }
                PixelLayout::new(information.layout.component, bands.len())
            }
            None => information.layout,
        };

        let layout = storage.output_layout(selected);
        if lookup(selected.component, selected.components, layout.component, layout.components).is_none() {
            return Err(ConversionError::Unsupported {
                input: selected.component,
                input_components: selected.components,
                output: layout.component,
                output_components: layout.components,
            }
            .into());
        }

        storage.write_information(
            &StorageInformation::new(Region::from_size(region.size), layout)
                .with_metadata(information.metadata.clone()),
        )?;
        debug!(
            "Output {} -> {}: {} as {}",
            node,
            storage.name(),
            region,
            layout
        );

        Ok(Self {
            node,
            region,
            bands: bands.map(<[usize]>::to_vec),
            layout,
        })
    }

    pub(crate) fn constraints(storage: &dyn RasterStorage) -> StorageConstraints {
        StorageConstraints::new(storage.name(), storage.can_stream_write())
            .with_block_size(storage.block_size())
    }

    /// Copy `partition` out of the materialized node and hand it to the storage.
    pub(crate) fn write(
        &self,
        graph: &PipelineGraph,
        storage: &mut dyn RasterStorage,
        partition: Region,
    ) -> StrataResult<()> {
        if partition.is_empty() {
            return Ok(());
        }
        let mut buffer: PixelBuffer = graph.output_buffer(self.node, partition)?;
        if let Some(bands) = &self.bands {
            buffer = buffer.select_components(bands)?;
        }
        if buffer.layout() != self.layout {
            buffer = convert_buffer(&buffer, self.layout)?;
        }
        let offset = [-self.region.index[0], -self.region.index[1]];
        storage.write(&partition.shifted(offset), &buffer)?;
        Ok(())
    }
}

/// Streams one node into one storage.
///
/// ```ignore
/// let mut writer = ImageWriter::new()
///     .with_input(node)
///     .with_storage(RawFileStorage::new("out.raw"));
/// writer.streaming_manager_mut().set_automatic_tiled(64, 1.0);
/// let summary = writer.write(&mut graph)?;
/// ```
pub struct ImageWriter {
    input: Option<NodeId>,
    storage: Option<Box<dyn RasterStorage>>,
    manager: StreamingManager,
    box_region: Option<Region>,
    bands: Option<Vec<usize>>,
    cancellation: CancellationToken,
    progress: Option<ProgressCallback>,
    config_warnings: Vec<StreamingWarning>,
    state: WriterState,
}

impl Default for ImageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter {
    pub fn new() -> Self {
        Self {
            input: None,
            storage: None,
            manager: StreamingManager::new(),
            box_region: None,
            bands: None,
            cancellation: CancellationToken::new(),
            progress: None,
            config_warnings: Vec::new(),
            state: WriterState::Idle,
        }
    }

    /// Writer for an extended filename, with the storage taken from the
    /// global registry.
    pub fn for_filename(filename: &str) -> StrataResult<Self> {
        let parsed = ExtendedFilename::parse(filename)?;
        let storage = create_storage(&parsed.path)?;
        let mut writer = Self::new().with_boxed_storage(storage);
        writer.apply_extended_filename(&parsed);
        Ok(writer)
    }

    pub fn with_input(mut self, node: NodeId) -> Self {
        self.input = Some(node);
        self
    }

    pub fn set_input(&mut self, node: NodeId) {
        self.input = Some(node);
    }

    pub fn input(&self) -> Option<NodeId> {
        self.input
    }

    pub fn with_storage(self, storage: impl RasterStorage + 'static) -> Self {
        self.with_boxed_storage(Box::new(storage))
    }

    pub fn with_boxed_storage(mut self, storage: Box<dyn RasterStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn set_storage(&mut self, storage: Box<dyn RasterStorage>) {
        self.storage = Some(storage);
    }

    pub fn storage(&self) -> Option<&dyn RasterStorage> {
        self.storage.as_deref()
    }

    /// Take the storage back, e.g. to inspect it after a write.
    pub fn take_storage(&mut self) -> Option<Box<dyn RasterStorage>> {
        self.storage.take()
    }

    pub fn with_streaming_manager(mut self, manager: StreamingManager) -> Self {
        self.manager = manager;
        self
    }

    pub fn streaming_manager(&self) -> &StreamingManager {
        &self.manager
    }

    pub fn streaming_manager_mut(&mut self) -> &mut StreamingManager {
        &mut self.manager
    }

    /// Restrict the write to a sub-region of the input.
    pub fn with_box(mut self, region: Region) -> Self {
        self.box_region = Some(region);
        self
    }

    pub fn set_box(&mut self, region: Option<Region>) {
        self.box_region = region;
    }

    /// Write only these 0-based components, in this order.
    pub fn with_bands(mut self, bands: Vec<usize>) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn set_bands(&mut self, bands: Option<Vec<usize>>) {
        self.bands = bands;
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn set_progress_callback(&mut self, callback: Option<ProgressCallback>) {
        self.progress = callback;
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that stops the write at the next partition boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Apply streaming options. Their warnings are reported with the plan.
    pub fn apply_options(&mut self, options: &StreamingOptions) {
        let warnings = options.apply(&mut self.manager);
        self.config_warnings.extend(warnings);
    }

    /// Apply the streaming options, box and bands of an extended filename.
    pub fn apply_extended_filename(&mut self, filename: &ExtendedFilename) {
        self.config_warnings.extend(filename.warnings.iter().cloned());
        self.apply_options(&filename.options);
        if filename.box_region.is_some() {
            self.box_region = filename.box_region;
        }
        if filename.bands.is_some() {
            self.bands = filename.bands.clone();
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Stream the input node into the storage.
    ///
    /// Partitions are written in plan order. A raised cancellation token
    /// stops the loop before the next partition with
    /// [`WriteError::Aborted`]; partitions already written stay written.
    pub fn write(&mut self, graph: &mut PipelineGraph) -> StrataResult<WriteSummary> {
        self.state = WriterState::Preparing;
        let result = self.run(graph);
        self.state = match &result {
            Ok(_) => WriterState::Done,
            Err(_) => WriterState::Aborted,
        };
        if let Err(e) = &result {
            if e.is_fatal() {
                error!("Write failed: {}", e);
            }
        }
        result
    }

    fn run(&mut self, graph: &mut PipelineGraph) -> StrataResult<WriteSummary> {
        let input = self.input.ok_or(WriteError::NoInput)?;
        let storage = self.storage.as_deref_mut().ok_or(WriteError::NoStorage)?;
        let start = Instant::now();

        let output = PreparedOutput::prepare(
            graph,
            input,
            storage,
            self.box_region,
            self.bands.as_deref(),
        )?;

        for warning in &self.config_warnings {
            warn!("{}", warning);
        }
        let constraints = [PreparedOutput::constraints(&*storage)];
        let plan = self
            .manager
            .prepare_streaming(graph, &[input], output.region, &constraints)?;

        let total = plan.number_of_splits();
        let mut tracker = ProgressTracker::new(total).with_callback(self.progress.clone());
        tracker.start();
        self.state = WriterState::Iterating;

        for (index, &partition) in plan.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                info!("Write cancelled after {}/{} partitions", index, total);
                tracker.abort();
                return Err(WriteError::Aborted {
                    completed: index,
                    total,
                }
                .into());
            }

            let partition_start = Instant::now();
            tracker.partition_started(index, partition);
            let written = write_partition(graph, &output, storage, partition, &|p: f32| {
                tracker.partition_progress(index, f64::from(p))
            });
            if let Err(e) = written {
                tracker.report_error(e.node_id(), e.to_string());
                return Err(e);
            }
            tracker.partition_completed(index, partition_start.elapsed().as_millis() as u64);
        }

        storage.finalize()?;
        tracker.complete();

        let mut warnings = self.config_warnings.clone();
        warnings.extend(plan.warnings.iter().cloned());
        info!(
            "Wrote {} in {} partitions to {}",
            output.region,
            total,
            storage.name()
        );
        Ok(WriteSummary {
            plan,
            partitions_written: total,
            duration_ms: start.elapsed().as_millis() as u64,
            warnings,
        })
    }
}

fn write_partition(
    graph: &mut PipelineGraph,
    output: &PreparedOutput,
    storage: &mut dyn RasterStorage,
    partition: Region,
    progress: &dyn Fn(f32),
) -> StrataResult<()> {
    let roots = [output.node];
    graph.reset_requested_regions(&roots)?;
    graph.set_requested_region(output.node, partition)?;
    graph.propagate_requested_regions(&roots)?;
    graph.update_data(&roots, Some(progress))?;
    output.write(graph, storage, partition)?;
    graph.release_data(&roots)?;
    Ok(())
}
