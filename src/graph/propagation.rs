//! The three pipeline passes.
//!
//! 1. [`update_output_information`](PipelineGraph::update_output_information):
//!    producers first, metadata only.
//! 2. [`propagate_requested_regions`](PipelineGraph::propagate_requested_regions):
//!    consumers first. Each node maps its request onto its inputs, crops it to
//!    their largest region and unions it into whatever they already have to
//!    produce, so a shared producer ends up with the union of its consumers'
//!    needs.
//! 3. [`update_data`](PipelineGraph::update_data): producers first. A node
//!    whose buffer already covers its request is not regenerated, and nothing
//!    upstream of it is touched.

use crate::core::buffer::PixelBuffer;
use crate::core::context::{GenerateContext, InputView};
use crate::core::error::{BufferError, NodeId, PipelineError, PipelineResult};
use crate::core::node::RegionPolicy;
use crate::core::region::Region;
use crate::core::types::OutputInformation;
use crate::graph::structure::PipelineGraph;
use crate::graph::topology::TopologyAnalyzer;
use log::{debug, trace};
use std::collections::HashSet;

impl PipelineGraph {
    /// Metadata pass over everything `root` depends on.
    ///
    /// Fails with [`PipelineError::MissingInput`] on an unset slot and with
    /// [`PipelineError::RegionMismatch`] when a filter declaring co-registered
    /// inputs gets inputs of different extents.
    pub fn update_output_information(&mut self, root: NodeId) -> PipelineResult<OutputInformation> {
        let order = TopologyAnalyzer::new(self).upstream_order(&[root])?;

        for id in order {
            let node = self.get_node(id)?;
            let metadata = node.filter.metadata();
            let inputs = node
                .inputs
                .iter()
                .enumerate()
                .map(|(slot, input)| {
                    let upstream = input.ok_or(PipelineError::MissingInput { node_id: id, slot })?;
                    self.information(upstream).cloned()
                })
                .collect::<PipelineResult<Vec<_>>>()?;

            if metadata.co_registered {
                if let Some(first) = inputs.first() {
                    for (slot, info) in inputs.iter().enumerate().skip(1) {
                        if info.largest_region != first.largest_region {
                            return Err(PipelineError::RegionMismatch {
                                node_id: id,
                                slot,
                                expected: first.largest_region,
                                got: info.largest_region,
                            });
                        }
                    }
                }
            }

            let information = node
                .filter
                .output_information(&inputs)
                .map_err(|e| match e {
                    PipelineError::InvalidInputs(error) => PipelineError::NodeFailed { node_id: id, error },
                    other => other,
                })?;
            trace!(
                "Node {} ({}): largest region {}, {}",
                id,
                metadata.id,
                information.largest_region,
                information.layout
            );
            self.get_node_mut(id)?.state.information = Some(information);
        }

        self.information(root).cloned()
    }

    /// Push the roots' requested regions up through the graph.
    pub fn propagate_requested_regions(&mut self, roots: &[NodeId]) -> PipelineResult<()> {
        let order = TopologyAnalyzer::new(self).downstream_order(roots)?;

        for id in order {
            let node = self.get_node(id)?;
            let information = self.information(id)?;
            let mut requested = node.state.requested;

            if node.filter.region_policy() == RegionPolicy::WholeExtent && !requested.is_empty() {
                requested = information.largest_region;
            }

            let mut upstream_requests = Vec::with_capacity(node.inputs.len());
            if !requested.is_empty() {
                for (slot, input) in node.inputs.iter().enumerate() {
                    let upstream = input.ok_or(PipelineError::MissingInput { node_id: id, slot })?;
                    let upstream_info = self.information(upstream)?;
                    let wanted = node
                        .filter
                        .input_requested_region(slot, &requested, upstream_info)?;
                    let cropped = wanted.crop(&upstream_info.largest_region)?;
                    upstream_requests.push((upstream, cropped));
                }
            }

            self.get_node_mut(id)?.state.requested = requested;
            for (upstream, region) in upstream_requests {
                trace!("Node {} asks {} for {}", id, upstream, region);
                self.widen_requested_region(upstream, region)?;
            }
        }
        Ok(())
    }

    /// Propagate the request of a single root.
    pub fn propagate_requested_region(&mut self, root: NodeId) -> PipelineResult<()> {
        self.propagate_requested_regions(&[root])
    }

    /// Materialize every node upstream of the roots, producers first.
    ///
    /// `progress`, when given, receives the fractional progress reported by
    /// the first root while it generates.
    pub fn update_data(
        &mut self,
        roots: &[NodeId],
        progress: Option<&dyn Fn(f32)>,
    ) -> PipelineResult<()> {
        let order = TopologyAnalyzer::new(self).upstream_order(roots)?;
        let reporter = roots.first().copied();

        // Consumers first: inputs of a node that reuses its buffer are not needed.
        let mut needed: HashSet<NodeId> = roots.iter().copied().collect();
        for &id in order.iter().rev() {
            let node = self.get_node(id)?;
            let state = &node.state;
            if !needed.contains(&id) || state.requested.is_empty() {
                continue;
            }
            if state.buffer.is_some() && state.buffered.contains(&state.requested) {
                continue;
            }
            needed.extend(node.inputs.iter().flatten().copied());
        }

        for id in order {
            if !needed.contains(&id) {
                continue;
            }
            let state = &self.get_node(id)?.state;
            let requested = state.requested;
            if requested.is_empty() {
                continue;
            }
            if state.buffer.is_some() && state.buffered.contains(&requested) {
                trace!("Node {} reuses {}", id, state.buffered);
                continue;
            }

            let buffer = self.generate_node(id, requested, progress.filter(|_| Some(id) == reporter))?;
            let state = &mut self.get_node_mut(id)?.state;
            state.buffer = Some(buffer);
            state.buffered = requested;
        }
        Ok(())
    }

    fn generate_node(
        &self,
        id: NodeId,
        requested: Region,
        progress: Option<&dyn Fn(f32)>,
    ) -> PipelineResult<PixelBuffer> {
        let node = self.get_node(id)?;
        let information = self.information(id)?;

        let mut views = Vec::with_capacity(node.inputs.len());
        for (slot, input) in node.inputs.iter().enumerate() {
            let upstream = input.ok_or(PipelineError::MissingInput { node_id: id, slot })?;
            let upstream_node = self.get_node(upstream)?;
            let state = &upstream_node.state;
            let buffer = state.buffer.as_ref().ok_or(PipelineError::NotBuffered {
                node_id: upstream,
                requested: state.requested,
                buffered: state.buffered,
            })?;
            views.push(InputView {
                information: self.information(upstream)?,
                buffered_region: state.buffered,
                buffer,
            });
        }

        debug!("Generating {} for node {} ({})", requested, id, node.display_name());
        let mut ctx = GenerateContext::new(id, requested, information, views);
        if let Some(progress) = progress {
            ctx = ctx.with_progress(progress);
        }
        let buffer = node.filter.generate(&ctx)?;

        if buffer.pixel_count() as u64 != requested.pixel_count() {
            return Err(PipelineError::OutputSizeMismatch {
                node_id: id,
                expected: requested.pixel_count(),
                got: buffer.pixel_count() as u64,
            });
        }
        if buffer.layout() != information.layout {
            return Err(BufferError::LayoutMismatch {
                expected: information.layout,
                got: buffer.layout(),
            }
            .into());
        }
        Ok(buffer)
    }

    /// Clear the requested region of every node upstream of the roots.
    pub fn reset_requested_regions(&mut self, roots: &[NodeId]) -> PipelineResult<()> {
        for id in TopologyAnalyzer::new(self).upstream_order(roots)? {
            self.get_node_mut(id)?.state.requested = Region::empty();
        }
        Ok(())
    }

    /// Drop every buffer upstream of the roots.
    pub fn release_data(&mut self, roots: &[NodeId]) -> PipelineResult<()> {
        for id in TopologyAnalyzer::new(self).upstream_order(roots)? {
            let state = &mut self.get_node_mut(id)?.state;
            state.buffer = None;
            state.buffered = Region::empty();
        }
        Ok(())
    }

    /// Copy `region` out of a node's buffer.
    pub fn output_buffer(&self, id: NodeId, region: Region) -> PipelineResult<PixelBuffer> {
        let state = &self.get_node(id)?.state;
        match &state.buffer {
            Some(buffer) if state.buffered.contains(&region) => {
                Ok(buffer.extract(&state.buffered, &region)?)
            }
            _ => Err(PipelineError::NotBuffered {
                node_id: id,
                requested: region,
                buffered: state.buffered,
            }),
        }
    }

    /// Nodes upstream of the roots that cannot generate partial regions.
    pub fn non_streamable_nodes(&self, roots: &[NodeId]) -> PipelineResult<Vec<NodeId>> {
        let mut found = Vec::new();
        for id in TopologyAnalyzer::new(self).upstream_order(roots)? {
            if self.get_node(id)?.filter.region_policy() == RegionPolicy::WholeExtent {
                found.push(id);
            }
        }
        Ok(found)
    }

    /// Sum of bytes per pixel over the distinct nodes upstream of the roots.
    pub fn pipeline_bytes_per_pixel(&self, roots: &[NodeId]) -> PipelineResult<u64> {
        let mut total = 0u64;
        for id in TopologyAnalyzer::new(self).upstream_order(roots)? {
            total += self.information(id)?.layout.bytes_per_pixel() as u64;
        }
        Ok(total)
    }
}
