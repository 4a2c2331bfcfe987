//! Update Scheduler
//!
//! The scheduler decides when dirtied effects run. It holds no callbacks of
//! its own; the runtime pops IDs from it and runs the matching observers.
//!
//! # Algorithm
//!
//! 1. A write marks effects dirty and enqueues them. The queue is an
//!    insertion-ordered set, so an effect dirtied twice runs once, in the
//!    position where it was first dirtied.
//! 2. Outside a batch, the writer asks for a flush right away. Inside a
//!    batch only the depth counter moves; the flush happens when the
//!    outermost batch closes.
//! 3. A flush pops effects until the queue is empty. Effects dirtied while
//!    the flush runs are appended to the same queue instead of starting a
//!    nested flush, so chains of effects never grow the stack.
//! 4. Every pop is counted against a ceiling. Exceeding it means an effect
//!    keeps re-triggering itself.

use indexmap::IndexSet;

use super::node::NodeId;

/// A write deferred until no computation is on the tracking stack.
pub type DeferredTask = Box<dyn FnOnce()>;

/// Batch depth, pending effects and flush state for one runtime.
pub struct UpdateScheduler {
    depth: usize,
    queue: IndexSet<NodeId>,
    flushing: bool,
    iterations: usize,
    deferred: Vec<DeferredTask>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self {
            depth: 0,
            queue: IndexSet::new(),
            flushing: false,
            iterations: 0,
            deferred: Vec::new(),
        }
    }

    /// Enter a batch. Returns the new depth.
    pub fn enter_batch(&mut self) -> usize {
        self.depth += 1;
        self.depth
    }

    /// Leave a batch. Returns the remaining depth.
    pub fn exit_batch(&mut self) -> usize {
        self.depth = self.depth.saturating_sub(1);
        self.depth
    }

    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Whether a flush should start right now: no batch or flush is open
    /// and there is queued or deferred work.
    pub fn should_flush(&self) -> bool {
        self.depth == 0 && !self.flushing && (!self.queue.is_empty() || !self.deferred.is_empty())
    }

    /// Queue an effect. Returns false if it was already pending.
    pub fn enqueue(&mut self, node_id: NodeId) -> bool {
        self.queue.insert(node_id)
    }

    pub fn dequeue(&mut self, node_id: NodeId) {
        self.queue.shift_remove(&node_id);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Start a flush. Returns false if one is already running.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.iterations = 0;
        true
    }

    /// Pop the next effect to run together with the number of pops so far
    /// in this flush.
    pub fn next(&mut self) -> Option<(NodeId, usize)> {
        let node_id = self.queue.shift_remove_index(0)?;
        self.iterations += 1;
        Some((node_id, self.iterations))
    }

    /// Finish a flush. Returns whatever was still queued, which is only
    /// non-empty when the flush was abandoned.
    pub fn end_flush(&mut self) -> Vec<NodeId> {
        self.flushing = false;
        self.iterations = 0;
        self.queue.drain(..).collect()
    }

    pub fn defer(&mut self, task: DeferredTask) {
        self.deferred.push(task);
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredTask> {
        std::mem::take(&mut self.deferred)
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("depth", &self.depth)
            .field("pending", &self.queue.len())
            .field("flushing", &self.flushing)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_batches_track_depth() {
        let mut scheduler = UpdateScheduler::new();
        assert!(!scheduler.is_batching());

        assert_eq!(scheduler.enter_batch(), 1);
        assert_eq!(scheduler.enter_batch(), 2);
        assert_eq!(scheduler.exit_batch(), 1);
        assert!(scheduler.is_batching());
        assert_eq!(scheduler.exit_batch(), 0);
        assert!(!scheduler.is_batching());

        // Unbalanced exits never underflow
        assert_eq!(scheduler.exit_batch(), 0);
    }

    #[test]
    fn queue_runs_in_first_dirtied_order_once() {
        let mut scheduler = UpdateScheduler::new();
        let a = NodeId::new();
        let b = NodeId::new();

        assert!(scheduler.enqueue(a));
        assert!(scheduler.enqueue(b));
        assert!(!scheduler.enqueue(a));

        assert!(scheduler.begin_flush());
        assert_eq!(scheduler.next(), Some((a, 1)));
        assert_eq!(scheduler.next(), Some((b, 2)));
        assert_eq!(scheduler.next(), None);
        assert!(scheduler.end_flush().is_empty());
    }

    #[test]
    fn enqueue_during_flush_appends() {
        let mut scheduler = UpdateScheduler::new();
        let a = NodeId::new();
        let b = NodeId::new();

        scheduler.enqueue(a);
        scheduler.begin_flush();
        assert!(!scheduler.begin_flush());
        assert!(!scheduler.should_flush());

        assert_eq!(scheduler.next().map(|(id, _)| id), Some(a));
        // a re-dirtied itself while running, b was dirtied by it
        scheduler.enqueue(b);
        scheduler.enqueue(a);
        assert_eq!(scheduler.next().map(|(id, _)| id), Some(b));
        assert_eq!(scheduler.next(), Some((a, 3)));
        scheduler.end_flush();
    }

    #[test]
    fn should_flush_waits_for_outermost_batch() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.enter_batch();
        scheduler.enqueue(NodeId::new());
        assert!(!scheduler.should_flush());
        scheduler.exit_batch();
        assert!(scheduler.should_flush());
    }

    #[test]
    fn deferred_tasks_are_taken_once() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.defer(Box::new(|| {}));
        // Deferred work alone is reason to flush
        assert!(scheduler.should_flush());
        assert_eq!(scheduler.take_deferred().len(), 1);
        assert!(scheduler.take_deferred().is_empty());
        assert!(!scheduler.should_flush());
    }
}
