//! DAG validation and the indexed node graph the processor walks.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow and made of ASCII letters,
//!    digits, `_` and `-` (the characters a `{{ $jobs.<id> }}` template can
//!    name).
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. The start node must exist.
//! 4. The directed graph must be acyclic (topological sort must succeed).
//! 5. Every node must be reachable from the start node.
//!
//! Nodes are addressed by their index in `Workflow::nodes`; adjacency lists
//! hold indices, never references between nodes.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::NodeDefinition, EngineError, Workflow};

/// Adjacency view over a validated workflow.
#[derive(Debug)]
pub struct WorkflowGraph<'w> {
    workflow: &'w Workflow,
    index: HashMap<&'w str, usize>,
    downstream: Vec<Vec<usize>>,
    upstream: Vec<Vec<usize>>,
    start: usize,
}

impl<'w> WorkflowGraph<'w> {
    /// Validate `workflow` and build its adjacency lists.
    ///
    /// Downstream lists keep edge declaration order; that order decides
    /// which branch the processor visits first.
    ///
    /// # Errors
    /// - [`EngineError::InvalidNodeId`] if an ID is empty or has other characters.
    /// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
    /// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
    /// - [`EngineError::UnknownStartNode`] if the start node is missing.
    /// - [`EngineError::CycleDetected`] if the graph is not acyclic.
    /// - [`EngineError::UnreachableNode`] if a node cannot be reached from the start.
    pub fn build(workflow: &'w Workflow) -> Result<Self, EngineError> {
        // -------------------------------------------------------------------
        // 1. Ensure node IDs are well-formed and unique
        // -------------------------------------------------------------------
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(workflow.nodes.len());
        for (i, node) in workflow.nodes.iter().enumerate() {
            if !is_valid_node_id(&node.id) {
                return Err(EngineError::InvalidNodeId(node.id.clone()));
            }
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(EngineError::DuplicateNodeId(node.id.clone()));
            }
        }

        // -------------------------------------------------------------------
        // 2. Validate edge endpoints and build adjacency
        // -------------------------------------------------------------------
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); workflow.nodes.len()];
        let mut upstream: Vec<Vec<usize>> = vec![Vec::new(); workflow.nodes.len()];
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

        for edge in &workflow.edges {
            let from = *index.get(edge.from.as_str()).ok_or_else(|| {
                EngineError::UnknownNodeReference { node_id: edge.from.clone(), side: "from" }
            })?;
            let to = *index.get(edge.to.as_str()).ok_or_else(|| {
                EngineError::UnknownNodeReference { node_id: edge.to.clone(), side: "to" }
            })?;
            if seen_edges.insert((from, to)) {
                downstream[from].push(to);
                upstream[to].push(from);
            }
        }

        // -------------------------------------------------------------------
        // 3. Start node
        // -------------------------------------------------------------------
        let start = *index
            .get(workflow.start.as_str())
            .ok_or_else(|| EngineError::UnknownStartNode(workflow.start.clone()))?;

        let graph = Self { workflow, index, downstream, upstream, start };

        // -------------------------------------------------------------------
        // 4. Acyclic
        // -------------------------------------------------------------------
        if graph.topological_order().len() != workflow.nodes.len() {
            return Err(EngineError::CycleDetected);
        }

        // -------------------------------------------------------------------
        // 5. Reachable from start
        // -------------------------------------------------------------------
        let mut reached = vec![false; workflow.nodes.len()];
        let mut queue = VecDeque::from([start]);
        reached[start] = true;
        while let Some(i) = queue.pop_front() {
            for &next in &graph.downstream[i] {
                if !reached[next] {
                    reached[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if let Some(i) = reached.iter().position(|r| !r) {
            return Err(EngineError::UnreachableNode(workflow.nodes[i].id.clone()));
        }

        Ok(graph)
    }

    /// Kahn's algorithm, ties broken by node declaration order.
    ///
    /// Shorter than the node count when the graph has a cycle.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..in_degree.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(in_degree.len());

        while let Some(i) = queue.pop_front() {
            sorted.push(i);
            for &next in &self.downstream[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        sorted
    }

    pub fn workflow(&self) -> &'w Workflow {
        self.workflow
    }

    pub fn node(&self, index: usize) -> &'w NodeDefinition {
        &self.workflow.nodes[index]
    }

    pub fn index_of(&self, node_id: &str) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn downstream(&self, index: usize) -> &[usize] {
        &self.downstream[index]
    }

    pub fn upstream(&self, index: usize) -> &[usize] {
        &self.upstream[index]
    }

    pub fn len(&self) -> usize {
        self.workflow.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflow.nodes.is_empty()
    }
}

fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate the workflow's DAG and return node IDs in topological order.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    let graph = WorkflowGraph::build(workflow)?;
    Ok(graph
        .topological_order()
        .into_iter()
        .map(|i| workflow.nodes[i].id.clone())
        .collect())
}
