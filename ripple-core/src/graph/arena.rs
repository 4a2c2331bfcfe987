//! Node Arena
//!
//! Owns every node record of one runtime, indexed by ID, together with the
//! edges between them. Dirty propagation lives here because it only needs
//! the edge structure; running effects and recomputing memos is the
//! runtime's job.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use super::node::{Node, NodeId, NodeKind, NodeState};

/// A point-in-time description of one node, for debugging and inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: NodeState,
    pub label: Option<String>,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

/// The dependency graph of one runtime.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph together with every edge touching it.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn kind(&self, node_id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node_id).map(Node::kind)
    }

    pub fn state(&self, node_id: NodeId) -> Option<NodeState> {
        self.nodes.get(&node_id).map(Node::state)
    }

    pub fn set_state(&mut self, node_id: NodeId, state: NodeState) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            match state {
                NodeState::Clean => node.mark_clean(),
                NodeState::MaybeDirty => node.mark_maybe_dirty(),
                NodeState::Dirty => node.mark_dirty(),
            }
        }
    }

    /// Add a dependency edge: `dependent` reads `dependency`.
    ///
    /// Both ends must be present; edges to nodes that were already released
    /// are ignored.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return false;
        }
        let inserted = self
            .nodes
            .get_mut(&dependent)
            .map(|node| node.add_dependency(dependency))
            .unwrap_or(false);
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        inserted
    }

    /// Unsubscribe `dependent` from everything it read during its last run.
    pub fn clear_dependencies(&mut self, dependent: NodeId) {
        let deps = match self.nodes.get_mut(&dependent) {
            Some(node) => node.take_dependencies(),
            None => return,
        };
        for dep_id in deps {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(dependent);
            }
        }
    }

    pub fn dependencies(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node_id)
            .map(|node| node.dependencies().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn dependents(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node_id)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mark a changed node's dependents and propagate dirty flags.
    ///
    /// Direct dependents become `Dirty`; everything reachable through a memo
    /// becomes `MaybeDirty`. Propagation stops at nodes that were already
    /// non-clean, since their downstream was marked when they were.
    ///
    /// Returns the effects that transitioned out of `Clean`, in the order
    /// they were reached.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        self.propagate(source_id, NodeState::Dirty)
    }

    /// Force a memo to recompute on its next read. Its dependents become
    /// `MaybeDirty`, since the recomputation may still yield an equal value.
    ///
    /// Returns the effects that transitioned out of `Clean`.
    pub fn mark_stale(&mut self, node_id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return Vec::new();
        };
        node.mark_dirty();
        self.propagate(node_id, NodeState::MaybeDirty)
    }

    fn propagate(&mut self, start: NodeId, status: NodeState) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut queue: VecDeque<(NodeId, NodeState)> = VecDeque::new();

        if let Some(source) = self.nodes.get(&start) {
            for dependent_id in source.dependents() {
                queue.push_back((*dependent_id, status));
            }
        }

        // BFS so that effects are reported in subscription order
        while let Some((node_id, status)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let was_clean = node.is_clean();
            if status == NodeState::Dirty {
                node.mark_dirty();
            } else {
                node.mark_maybe_dirty();
            }
            if !was_clean {
                continue;
            }

            match node.kind() {
                NodeKind::Derived => {
                    for dependent_id in node.dependents() {
                        queue.push_back((*dependent_id, NodeState::MaybeDirty));
                    }
                }
                NodeKind::Effect => effects.push(node_id),
                NodeKind::Source => {}
            }
        }

        effects
    }

    /// Confirm that a memo's value changed: its `MaybeDirty` dependents
    /// become `Dirty`.
    pub fn confirm_changed(&mut self, node_id: NodeId) {
        for dependent_id in self.dependents(node_id) {
            if let Some(node) = self.nodes.get_mut(&dependent_id) {
                if node.state() == NodeState::MaybeDirty {
                    node.mark_dirty();
                }
            }
        }
    }

    pub fn set_label(&mut self, node_id: NodeId, label: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.set_label(label);
        }
    }

    /// Describe every live node, ordered by ID.
    pub fn snapshot(&self) -> Vec<NodeInfo> {
        let mut infos: Vec<NodeInfo> = self
            .nodes
            .values()
            .map(|node| NodeInfo {
                id: node.id(),
                kind: node.kind(),
                state: node.state(),
                label: node.label().map(str::to_owned),
                dependencies: node.dependencies().iter().copied().collect(),
                dependents: node.dependents().iter().copied().collect(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
