//! Topological ordering of the upstream part of a pipeline.
//!
//! Only nodes reachable from the requested roots matter to a write, so the
//! analyzer orders the upstream closure of a set of roots rather than the
//! whole graph.

use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::graph::structure::PipelineGraph;
use std::collections::{HashMap, HashSet};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a PipelineGraph,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a PipelineGraph) -> Self {
        Self { graph }
    }

    /// Every node the roots depend on (roots included), producers first.
    ///
    /// Each node appears once even when several consumers share it. Fails on
    /// an unset input slot or a cycle.
    pub fn upstream_order(&self, roots: &[NodeId]) -> PipelineResult<Vec<NodeId>> {
        let mut marks = HashMap::new();
        let mut order = Vec::new();

        for &root in roots {
            self.visit(root, &mut marks, &mut order, &mut Vec::new())?;
        }
        Ok(order)
    }

    /// Same set as [`upstream_order`](Self::upstream_order), consumers first.
    pub fn downstream_order(&self, roots: &[NodeId]) -> PipelineResult<Vec<NodeId>> {
        let mut order = self.upstream_order(roots)?;
        order.reverse();
        Ok(order)
    }

    /// Distinct nodes upstream of (and including) the roots.
    pub fn upstream_set(&self, roots: &[NodeId]) -> PipelineResult<HashSet<NodeId>> {
        Ok(self.upstream_order(roots)?.into_iter().collect())
    }

    /// Nodes without input slots among the roots' upstream closure.
    pub fn sources(&self, roots: &[NodeId]) -> PipelineResult<Vec<NodeId>> {
        let order = self.upstream_order(roots)?;
        let mut sources = Vec::new();
        for id in order {
            if self.graph.get_node(id)?.inputs.is_empty() {
                sources.push(id);
            }
        }
        Ok(sources)
    }

    fn visit(
        &self,
        id: NodeId,
        marks: &mut HashMap<NodeId, Mark>,
        order: &mut Vec<NodeId>,
        path: &mut Vec<NodeId>,
    ) -> PipelineResult<()> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|&n| n == id).unwrap_or(0);
                return Err(PipelineError::CycleDetected {
                    nodes: path[start..].to_vec(),
                });
            }
            None => {}
        }

        let node = self.graph.get_node(id)?;
        marks.insert(id, Mark::Visiting);
        path.push(id);

        for (slot, input) in node.inputs.iter().enumerate() {
            let upstream = input.ok_or(PipelineError::MissingInput { node_id: id, slot })?;
            self.visit(upstream, marks, order, path)?;
        }

        path.pop();
        marks.insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ComponentType, PixelLayout};
    use crate::filters::{BandStack, ConstantSource, LinearTransform};

    fn constant() -> ConstantSource {
        ConstantSource::new([4, 4], PixelLayout::scalar(ComponentType::U8), 3.0)
    }

    #[test]
    fn test_upstream_order_diamond() {
        let mut graph = PipelineGraph::new();
        let src = graph.add(constant());
        let left = graph.add(LinearTransform::new(2.0, 0.0));
        let right = graph.add(LinearTransform::new(0.5, 1.0));
        let stack = graph.add(BandStack::new(2));
        graph.connect(src, left, 0).unwrap();
        graph.connect(src, right, 0).unwrap();
        graph.connect(left, stack, 0).unwrap();
        graph.connect(right, stack, 1).unwrap();

        let analyzer = TopologyAnalyzer::new(&graph);
        let order = analyzer.upstream_order(&[stack]).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], src);
        assert_eq!(order[3], stack);
        assert_eq!(analyzer.downstream_order(&[stack]).unwrap()[0], stack);
        assert_eq!(analyzer.sources(&[stack]).unwrap(), vec![src]);
    }

    #[test]
    fn test_upstream_order_ignores_unrelated_nodes() {
        let mut graph = PipelineGraph::new();
        let src = graph.add(constant());
        let gain = graph.add(LinearTransform::new(2.0, 0.0));
        graph.add(constant());
        graph.connect(src, gain, 0).unwrap();

        let set = TopologyAnalyzer::new(&graph).upstream_set(&[gain]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_missing_input_reported() {
        let mut graph = PipelineGraph::new();
        let gain = graph.add(LinearTransform::new(2.0, 0.0));

        let err = TopologyAnalyzer::new(&graph)
            .upstream_order(&[gain])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingInput { node_id, slot: 0 } if node_id == gain
        ));
    }
}
