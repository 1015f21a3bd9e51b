//! Dependency analysis for workflow definitions.
//!
//! The definition's nodes and edges are loaded into a petgraph `DiGraph`,
//! then ordered with Kahn's algorithm and grouped into execution layers:
//!
//! - a node with no incoming edges has depth 0
//! - any other node has depth `1 + max(depth of its direct predecessors)`
//!
//! Every predecessor of a node sits in a strictly earlier layer, so running
//! layers in order with a barrier between them guarantees that all inputs of
//! a node exist by the time its layer starts.

use crate::definition::WorkflowDefinition;
use crate::error::GraphError;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};
use weft_core::NodeId;

/// The dependency graph of a single workflow definition.
///
/// Node weights are node IDs; edge weights are the edge's position in the
/// definition so that traversal order follows declaration order.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<NodeId, usize>,
    node_index_map: HashMap<NodeId, NodeIndex>,
}

/// A validated execution order for a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// All nodes in topological order.
    pub order: Vec<NodeId>,
    /// Nodes grouped by dependency depth; layer 0 runs first.
    pub layers: Vec<Vec<NodeId>>,
}

impl ExecutionPlan {
    /// Returns the number of layers.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Returns the layer a node was placed in.
    #[must_use]
    pub fn layer_of(&self, node_id: &NodeId) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.contains(node_id))
    }
}

impl WorkflowGraph {
    /// Builds the dependency graph for a definition.
    ///
    /// # Errors
    ///
    /// Returns an error if two nodes share an ID or an edge references an
    /// undeclared node. Cycles are only detected by [`Self::topological_sort`].
    pub fn build(workflow: &WorkflowDefinition) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
        let mut node_index_map = HashMap::with_capacity(workflow.nodes.len());

        for node in &workflow.nodes {
            if node_index_map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
            let index = graph.add_node(node.id.clone());
            node_index_map.insert(node.id.clone(), index);
        }

        for (position, edge) in workflow.edges.iter().enumerate() {
            let lookup = |node_id: &NodeId| {
                node_index_map
                    .get(node_id)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownNode {
                        edge_id: edge.id.clone(),
                        node_id: node_id.clone(),
                    })
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;
            graph.add_edge(source, target, position);
        }

        Ok(Self {
            graph,
            node_index_map,
        })
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the direct predecessors of a node, one entry per edge.
    pub fn predecessors(&self, node_id: &NodeId) -> Vec<&NodeId> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Incoming)
            .filter_map(|edge| self.graph.node_weight(edge.source()))
            .collect()
    }

    /// Orders the nodes with Kahn's algorithm.
    ///
    /// The queue is seeded with zero in-degree nodes in declaration order and
    /// successors are released in edge declaration order, so the result is
    /// deterministic for a given definition.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] if some nodes never reach zero
    /// in-degree.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.graph.node_count());
        while let Some(index) = queue.pop_front() {
            sorted.push(index);

            let mut outgoing: Vec<_> = self
                .graph
                .edges_directed(index, Direction::Outgoing)
                .map(|edge| (*edge.weight(), edge.target()))
                .collect();
            outgoing.sort_unstable_by_key(|(position, _)| *position);

            for (_, target) in outgoing {
                let degree = &mut in_degree[target.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }

        if sorted.len() < self.graph.node_count() {
            let unresolved = self
                .graph
                .node_indices()
                .filter(|idx| in_degree[idx.index()] > 0)
                .map(|idx| self.graph[idx].clone())
                .collect();
            return Err(GraphError::CycleDetected { unresolved });
        }

        Ok(sorted
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Groups topologically sorted nodes into layers by dependency depth.
    ///
    /// `sorted` must come from [`Self::topological_sort`] on this graph.
    #[must_use]
    pub fn build_execution_layers(&self, sorted: &[NodeId]) -> Vec<Vec<NodeId>> {
        let mut depths: HashMap<NodeIndex, usize> = HashMap::with_capacity(sorted.len());
        let mut layers: Vec<Vec<NodeId>> = Vec::new();

        for node_id in sorted {
            let Some(&index) = self.node_index_map.get(node_id) else {
                continue;
            };

            let depth = self
                .graph
                .edges_directed(index, Direction::Incoming)
                .filter_map(|edge| depths.get(&edge.source()))
                .max()
                .map_or(0, |deepest| deepest + 1);
            depths.insert(index, depth);

            if layers.len() <= depth {
                layers.resize_with(depth + 1, Vec::new);
            }
            layers[depth].push(node_id.clone());
        }

        layers
    }

    /// Builds, sorts and layers a definition in one step.
    ///
    /// # Errors
    ///
    /// Returns any structural error found while building or sorting.
    pub fn plan(workflow: &WorkflowDefinition) -> Result<ExecutionPlan, GraphError> {
        let graph = Self::build(workflow)?;
        let order = graph.topological_sort()?;
        let layers = graph.build_execution_layers(&order);
        Ok(ExecutionPlan { order, layers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::WorkflowEdge;
    use crate::node::WorkflowNode;

    fn workflow(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowDefinition {
        let mut workflow = WorkflowDefinition::new("test", "Test");
        for id in nodes {
            workflow = workflow.with_node(WorkflowNode::new(*id, "noop"));
        }
        for (i, (source, target)) in edges.iter().enumerate() {
            workflow = workflow.with_edge(WorkflowEdge::new(format!("e{i}"), *source, *target));
        }
        workflow
    }

    fn ids(layer: &[NodeId]) -> Vec<&str> {
        layer.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn unconnected_nodes_share_layer_zero() {
        let plan = WorkflowGraph::plan(&workflow(&["a", "b", "c"], &[])).unwrap();
        assert_eq!(plan.depth(), 1);
        assert_eq!(ids(&plan.layers[0]), vec!["a", "b", "c"]);
    }

    #[test]
    fn chain_produces_one_layer_per_node() {
        let plan =
            WorkflowGraph::plan(&workflow(&["c", "b", "a"], &[("a", "b"), ("b", "c")])).unwrap();
        assert_eq!(ids(&plan.order), vec!["a", "b", "c"]);
        assert_eq!(plan.depth(), 3);
        assert_eq!(plan.layer_of(&NodeId::from("c")), Some(2));
    }

    #[test]
    fn diamond_layers() {
        let plan = WorkflowGraph::plan(&workflow(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        ))
        .unwrap();

        assert_eq!(plan.layers.len(), 3);
        assert_eq!(ids(&plan.layers[0]), vec!["a"]);
        assert_eq!(ids(&plan.layers[1]), vec!["b", "c"]);
        assert_eq!(ids(&plan.layers[2]), vec!["d"]);
    }

    #[test]
    fn depth_follows_longest_path() {
        // a -> b -> c, and a -> c directly: c still waits for b.
        let plan = WorkflowGraph::plan(&workflow(
            &["a", "b", "c"],
            &[("a", "c"), ("a", "b"), ("b", "c")],
        ))
        .unwrap();

        assert_eq!(plan.layer_of(&NodeId::from("b")), Some(1));
        assert_eq!(plan.layer_of(&NodeId::from("c")), Some(2));
    }

    #[test]
    fn every_predecessor_is_in_an_earlier_layer() {
        let definition = workflow(
            &["a", "b", "c", "d", "e", "f"],
            &[
                ("a", "c"),
                ("b", "c"),
                ("c", "e"),
                ("d", "e"),
                ("a", "f"),
                ("e", "f"),
            ],
        );
        let graph = WorkflowGraph::build(&definition).unwrap();
        let order = graph.topological_sort().unwrap();
        let layers = graph.build_execution_layers(&order);
        let plan = ExecutionPlan { order, layers };

        for node in &definition.nodes {
            let own = plan.layer_of(&node.id).unwrap();
            for pred in graph.predecessors(&node.id) {
                assert!(plan.layer_of(pred).unwrap() < own);
            }
        }
    }

    #[test]
    fn parallel_edges_count_towards_in_degree() {
        let plan = WorkflowGraph::plan(&workflow(&["a", "b"], &[("a", "b"), ("a", "b")])).unwrap();
        assert_eq!(ids(&plan.order), vec!["a", "b"]);
        assert_eq!(plan.depth(), 2);
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let err = WorkflowGraph::plan(&workflow(&["a", "b"], &[("a", "b"), ("b", "a")]))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                unresolved: vec![NodeId::from("a"), NodeId::from("b")]
            }
        );
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let err = WorkflowGraph::plan(&workflow(&["a", "b"], &[("a", "b"), ("b", "b")]))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                unresolved: vec![NodeId::from("b")]
            }
        );
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let err = WorkflowGraph::build(&workflow(&["a", "a"], &[])).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateNode {
                node_id: NodeId::from("a")
            }
        );
    }

    #[test]
    fn edges_to_unknown_nodes_are_rejected() {
        let err = WorkflowGraph::build(&workflow(&["a"], &[("a", "ghost")])).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownNode { node_id, .. } if node_id.as_str() == "ghost"
        ));
    }

    #[test]
    fn empty_workflow_has_no_layers() {
        let plan = WorkflowGraph::plan(&workflow(&[], &[])).unwrap();
        assert!(plan.order.is_empty());
        assert!(plan.layers.is_empty());
    }

    #[test]
    fn counts_reflect_definition() {
        let graph = WorkflowGraph::build(&workflow(&["a", "b"], &[("a", "b")])).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }
}
