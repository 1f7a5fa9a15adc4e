//! Pipeline graph structure and node state.
//!
//! The PipelineGraph is an arena owning every node. Edges live on the
//! consumer as input slots, so a producer shared by several consumers
//! (a diamond) is simply an id appearing in several slots.

use crate::core::buffer::PixelBuffer;
use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::core::node::RasterFilter;
use crate::core::region::Region;
use crate::core::types::OutputInformation;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// Per-node pipeline state, rebuilt by the propagation passes.
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    /// Result of the last metadata pass.
    pub information: Option<OutputInformation>,
    /// Region consumers currently want.
    pub requested: Region,
    /// Region covered by `buffer`.
    pub buffered: Region,
    pub buffer: Option<PixelBuffer>,
}

/// A node instance in the graph.
#[derive(Clone)]
pub struct GraphNode {
    /// Unique identifier
    pub id: NodeId,
    /// The filter implementation
    pub filter: Box<dyn RasterFilter>,
    /// Upstream node of each input slot
    pub inputs: Vec<Option<NodeId>>,
    /// Optional display name override
    pub label: Option<String>,
    pub state: NodeState,
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("filter", &self.filter.metadata().name)
            .field("inputs", &self.inputs)
            .field("label", &self.label)
            .field("requested", &self.state.requested)
            .field("buffered", &self.state.buffered)
            .finish()
    }
}

impl GraphNode {
    /// Create a new graph node with one empty slot per declared input.
    pub fn new(filter: Box<dyn RasterFilter>) -> Self {
        let inputs = vec![None; filter.metadata().inputs];
        Self {
            id: NodeId::new(),
            filter,
            inputs,
            label: None,
            state: NodeState::default(),
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the display name (label or filter name).
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.filter.metadata().name)
    }

    /// Upstream ids of every connected slot.
    pub fn connected_inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().flatten().copied()
    }
}

/// The pipeline graph.
///
/// Uses IndexMap to maintain insertion order for consistent iteration.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    nodes: IndexMap<NodeId, GraphNode>,
}

impl PipelineGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
        }
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a node from a boxed filter and return the node ID.
    pub fn add_filter(&mut self, filter: Box<dyn RasterFilter>) -> NodeId {
        self.add_node(GraphNode::new(filter))
    }

    /// Add a node from a filter value.
    pub fn add(&mut self, filter: impl RasterFilter + 'static) -> NodeId {
        self.add_filter(Box::new(filter))
    }

    /// Remove a node, clearing every slot that referenced it.
    pub fn remove_node(&mut self, id: NodeId) -> PipelineResult<GraphNode> {
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(PipelineError::NodeNotFound(id))?;
        for other in self.nodes.values_mut() {
            for slot in other.inputs.iter_mut() {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }
        Ok(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, id: NodeId) -> PipelineResult<&GraphNode> {
        self.nodes.get(&id).ok_or(PipelineError::NodeNotFound(id))
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, id: NodeId) -> PipelineResult<&mut GraphNode> {
        self.nodes.get_mut(&id).ok_or(PipelineError::NodeNotFound(id))
    }

    /// Check if a node exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Feed the output of `from` into input `slot` of `to`.
    ///
    /// Replaces whatever was connected to that slot.
    pub fn connect(&mut self, from: NodeId, to: NodeId, slot: usize) -> PipelineResult<()> {
        self.get_node(from)?;
        let inputs = self.get_node(to)?.inputs.len();
        if slot >= inputs {
            return Err(PipelineError::InvalidSlot {
                node_id: to,
                slot,
                inputs,
            });
        }
        if self.is_upstream(to, from) {
            return Err(PipelineError::CycleDetected {
                nodes: vec![from, to],
            });
        }

        self.get_node_mut(to)?.inputs[slot] = Some(from);
        Ok(())
    }

    /// Clear input `slot` of `to`.
    pub fn disconnect(&mut self, to: NodeId, slot: usize) -> PipelineResult<Option<NodeId>> {
        let node = self.get_node_mut(to)?;
        let inputs = node.inputs.len();
        node.inputs
            .get_mut(slot)
            .map(Option::take)
            .ok_or(PipelineError::InvalidSlot {
                node_id: to,
                slot,
                inputs,
            })
    }

    /// Input slots of a node.
    pub fn inputs(&self, id: NodeId) -> PipelineResult<&[Option<NodeId>]> {
        Ok(&self.get_node(id)?.inputs)
    }

    /// Nodes reading `id` through at least one slot.
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.inputs.contains(&Some(id)))
            .map(|n| n.id)
            .collect()
    }

    /// Whether `candidate` is `of` or one of its (transitive) inputs.
    pub fn is_upstream(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([of]);

        while let Some(current) = queue.pop_front() {
            if current == candidate {
                return true;
            }
            if visited.insert(current) {
                if let Some(node) = self.nodes.get(&current) {
                    queue.extend(node.connected_inputs());
                }
            }
        }
        false
    }

    // ========================================================================
    // Node State
    // ========================================================================

    /// Output information from the last metadata pass.
    pub fn information(&self, id: NodeId) -> PipelineResult<&OutputInformation> {
        self.get_node(id)?
            .state
            .information
            .as_ref()
            .ok_or(PipelineError::InformationNotComputed(id))
    }

    /// Largest possible region from the last metadata pass.
    pub fn largest_region(&self, id: NodeId) -> PipelineResult<Region> {
        Ok(self.information(id)?.largest_region)
    }

    pub fn requested_region(&self, id: NodeId) -> PipelineResult<Region> {
        Ok(self.get_node(id)?.state.requested)
    }

    pub fn buffered_region(&self, id: NodeId) -> PipelineResult<Region> {
        Ok(self.get_node(id)?.state.buffered)
    }

    /// Replace the requested region of a node.
    pub fn set_requested_region(&mut self, id: NodeId, region: Region) -> PipelineResult<()> {
        self.get_node_mut(id)?.state.requested = region;
        Ok(())
    }

    /// Union `region` into the pending request of a node.
    pub fn widen_requested_region(&mut self, id: NodeId, region: Region) -> PipelineResult<()> {
        let state = &mut self.get_node_mut(id)?.state;
        state.requested = state.requested.union(&region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ComponentType, PixelLayout};
    use crate::filters::{ConstantSource, LinearTransform};

    fn source() -> GraphNode {
        GraphNode::new(Box::new(ConstantSource::new(
            [8, 8],
            PixelLayout::scalar(ComponentType::U8),
            1.0,
        )))
    }

    #[test]
    fn test_add_and_connect() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_node(source());
        let gain = graph.add(LinearTransform::new(2.0, 0.0));

        assert_eq!(graph.inputs(gain).unwrap(), &[None]);
        graph.connect(src, gain, 0).unwrap();
        assert_eq!(graph.inputs(gain).unwrap(), &[Some(src)]);
        assert_eq!(graph.consumers(src), vec![gain]);
        assert!(graph.is_upstream(src, gain));
        assert!(!graph.is_upstream(gain, src));

        assert_eq!(graph.disconnect(gain, 0).unwrap(), Some(src));
        assert_eq!(graph.inputs(gain).unwrap(), &[None]);
    }

    #[test]
    fn test_connect_rejects_bad_slot_and_cycle() {
        let mut graph = PipelineGraph::new();
        let a = graph.add(LinearTransform::new(1.0, 0.0));
        let b = graph.add(LinearTransform::new(1.0, 0.0));

        assert!(matches!(
            graph.connect(a, b, 1),
            Err(PipelineError::InvalidSlot { slot: 1, inputs: 1, .. })
        ));
        graph.connect(a, b, 0).unwrap();
        assert!(matches!(
            graph.connect(b, a, 0),
            Err(PipelineError::CycleDetected { .. })
        ));
        assert!(matches!(
            graph.connect(a, a, 0),
            Err(PipelineError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_remove_node_clears_slots() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_node(source());
        let gain = graph.add(LinearTransform::new(2.0, 0.0));
        graph.connect(src, gain, 0).unwrap();

        assert_eq!(graph.node_count(), 2);
        graph.remove_node(src).unwrap();
        assert!(!graph.has_node(src));
        assert_eq!(graph.nodes().count(), 1);
        assert_eq!(graph.inputs(gain).unwrap(), &[None]);
        assert!(matches!(
            graph.get_node(src),
            Err(PipelineError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_widen_requested_region_unions() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_node(source());
        graph
            .set_requested_region(src, Region::new([0, 0], [4, 2]))
            .unwrap();
        graph
            .widen_requested_region(src, Region::new([2, 4], [4, 2]))
            .unwrap();
        assert_eq!(
            graph.requested_region(src).unwrap(),
            Region::new([0, 0], [6, 6])
        );
    }

    #[test]
    fn test_information_before_metadata_pass() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_node(source().with_label("ones"));
        assert_eq!(graph.get_node(src).unwrap().display_name(), "ones");
        assert!(matches!(
            graph.information(src),
            Err(PipelineError::InformationNotComputed(_))
        ));
    }
}
