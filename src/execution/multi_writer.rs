//! Multi-output writer: several (node, storage) pairs streamed in lockstep.
//!
//! One plan is built from the first output's node. Every partition is
//! requested from all nodes before any of them is materialized, so shared
//! upstream nodes generate the union of what the outputs need once.

use crate::core::error::{NodeId, StrataResult, WriteError};
use crate::core::region::{Region, DIMENSION};
use crate::execution::progress::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::execution::writer::{PreparedOutput, WriteSummary, WriterState};
use crate::graph::structure::PipelineGraph;
use crate::io::storage::RasterStorage;
use crate::streaming::{StreamingManager, StreamingOptions, StreamingWarning};
use log::{error, info, warn};
use std::time::Instant;

struct OutputSlot {
    node: NodeId,
    storage: Box<dyn RasterStorage>,
}

/// Streams several nodes into several storages with one partition plan.
pub struct MultiImageWriter {
    outputs: Vec<OutputSlot>,
    manager: StreamingManager,
    cancellation: CancellationToken,
    progress: Option<ProgressCallback>,
    config_warnings: Vec<StreamingWarning>,
    state: WriterState,
}

impl Default for MultiImageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiImageWriter {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            manager: StreamingManager::new(),
            cancellation: CancellationToken::new(),
            progress: None,
            config_warnings: Vec::new(),
            state: WriterState::Idle,
        }
    }

    /// Add an output. The first one added drives the partition plan.
    pub fn add_output(&mut self, node: NodeId, storage: impl RasterStorage + 'static) {
        self.add_boxed_output(node, Box::new(storage));
    }

    pub fn add_boxed_output(&mut self, node: NodeId, storage: Box<dyn RasterStorage>) {
        self.outputs.push(OutputSlot { node, storage });
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
    }

    pub fn streaming_manager_mut(&mut self) -> &mut StreamingManager {
        &mut self.manager
    }

    pub fn apply_options(&mut self, options: &StreamingOptions) {
        let warnings = options.apply(&mut self.manager);
        self.config_warnings.extend(warnings);
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Stream every output. A failure in any output stops the whole write.
    pub fn write(&mut self, graph: &mut PipelineGraph) -> StrataResult<WriteSummary> {
        self.state = WriterState::Preparing;
        let result = self.run(graph);
        self.state = match &result {
            Ok(_) => WriterState::Done,
            Err(_) => WriterState::Aborted,
        };
        if let Err(e) = &result {
            if e.is_fatal() {
                error!("Multi-output write failed: {}", e);
            }
        }
        result
    }

    fn run(&mut self, graph: &mut PipelineGraph) -> StrataResult<WriteSummary> {
        if self.outputs.is_empty() {
            return Err(WriteError::NoOutputs.into());
        }
        let start = Instant::now();
        let roots: Vec<NodeId> = self.outputs.iter().map(|o| o.node).collect();

        let mut prepared = Vec::with_capacity(self.outputs.len());
        for output in &mut self.outputs {
            prepared.push(PreparedOutput::prepare(
                graph,
                output.node,
                output.storage.as_mut(),
                None,
                None,
            )?);
        }
        let constraints: Vec<_> = self
            .outputs
            .iter()
            .map(|o| PreparedOutput::constraints(o.storage.as_ref()))
            .collect();

        for warning in &self.config_warnings {
            warn!("{}", warning);
        }
        let reference = prepared[0].region;
        let plan = self
            .manager
            .prepare_streaming(graph, &roots, reference, &constraints)?;

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
            let progress = |p: f32| tracker.partition_progress(index, f64::from(p));
            let written = (|| -> StrataResult<()> {
                graph.reset_requested_regions(&roots)?;
                let pieces: Vec<Region> = prepared
                    .iter()
                    .map(|output| map_region(&partition, &reference, &output.region))
                    .collect();
                for (output, piece) in prepared.iter().zip(&pieces) {
                    if !piece.is_empty() {
                        graph.widen_requested_region(output.node, *piece)?;
                    }
                }
                graph.propagate_requested_regions(&roots)?;
                graph.update_data(&roots, Some(&progress))?;
                for ((output, slot), piece) in prepared.iter().zip(&mut self.outputs).zip(&pieces) {
                    output.write(graph, slot.storage.as_mut(), *piece)?;
                }
                graph.release_data(&roots)?;
                Ok(())
            })();
            if let Err(e) = written {
                tracker.report_error(e.node_id(), e.to_string());
                return Err(e);
            }
            tracker.partition_completed(index, partition_start.elapsed().as_millis() as u64);
        }

        for output in &mut self.outputs {
            output.storage.finalize()?;
        }
        tracker.complete();
        info!("Wrote {} outputs in {} partitions", self.outputs.len(), total);

        let mut warnings = self.config_warnings.clone();
        warnings.extend(plan.warnings.iter().cloned());
        Ok(WriteSummary {
            plan,
            partitions_written: total,
            duration_ms: start.elapsed().as_millis() as u64,
            warnings,
        })
    }
}

/// Map a partition of `reference` onto `target` proportionally along each
/// axis. Consecutive partitions of `reference` map onto non-overlapping
/// pieces of `target` that cover it.
pub fn map_region(partition: &Region, reference: &Region, target: &Region) -> Region {
    if reference.size == target.size {
        let delta = [
            target.index[0] - reference.index[0],
            target.index[1] - reference.index[1],
        ];
        return partition.shifted(delta);
    }

    let mut index = [0i64; DIMENSION];
    let mut size = [0u64; DIMENSION];
    for axis in 0..DIMENSION {
        let scale = |offset: i64| -> i64 {
            let offset = (offset - reference.index[axis]).max(0) as u128;
            let extent = reference.size[axis].max(1) as u128;
            (offset * target.size[axis] as u128 / extent) as i64 + target.index[axis]
        };
        let lower = scale(partition.index[axis]);
        let upper = scale(partition.upper(axis));
        index[axis] = lower;
        size[axis] = (upper - lower).max(0) as u64;
    }
    Region::new(index, size)
}
