//! Dependency Graph
//!
//! This module implements the bookkeeping side of the reactive engine: the
//! node arena holding edges between reactive values and computations, and
//! the scheduler deciding when dirtied effects run.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. Memos are only recomputed when read; effects are
//! queued on the scheduler.
//!
//! # Design Decisions
//!
//! 1. Nodes are plain records keyed by integer ID. Values and callbacks stay
//!    in the primitives, so the arena never calls user code and its lifetime
//!    is controlled by explicit release rather than by whoever holds a value.
//!
//! 2. We maintain both forward (dependencies) and reverse (dependents) edges
//!    so that re-running a computation can unsubscribe it in one pass.

mod arena;
mod node;
mod scheduler;

pub use arena::{Graph, NodeInfo};
pub use node::{Node, NodeId, NodeKind, NodeState};
pub use scheduler::{DeferredTask, UpdateScheduler};
