//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and the update scheduler, and it
//! decides when dirtied effects run.
//!
//! # How It Works
//!
//! 1. Every signal, memo and effect registers a node with the runtime.
//!
//! 2. When a memo or effect reads a signal, the runtime records an edge.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct dependents dirty and everything behind a memo
//!       maybe-dirty
//!    b. Queues the effects that were reached
//!    c. Flushes the queue, unless a batch is open or a flush is already
//!       running
//!    d. Memos are lazy - they recompute on next access
//!
//! 4. Before a maybe-dirty effect runs, the memos it read are brought up to
//!    date. The effect only runs if one of them produced a different value.
//!
//! # Thread Model
//!
//! There is one runtime per thread, stored in a thread-local alongside the
//! tracking context. Handles are `Send + Sync`, but a handle always reports
//! changes to the runtime of the thread it is used on.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use super::context::ReactiveContext;
use super::observer::Observer;
use crate::config::RuntimeConfig;
use crate::error::{panic_message, raise, ReactiveError};
use crate::graph::{DeferredTask, Graph, Node, NodeId, NodeInfo, NodeKind, NodeState, UpdateScheduler};

/// Callback receiving errors that were caught instead of propagated.
pub type ErrorHandler = Arc<dyn Fn(&ReactiveError) + Send + Sync>;

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// The per-thread reactive runtime.
///
/// All entry points are associated functions acting on the current thread's
/// instance. None of them call user code while the runtime is borrowed.
pub struct Runtime {
    graph: Graph,
    /// Every registered observer, memos included.
    observers: HashMap<NodeId, Weak<dyn Observer>>,
    /// Effects stay alive here until disposed.
    owned: HashMap<NodeId, Arc<dyn Observer>>,
    scheduler: UpdateScheduler,
    config: RuntimeConfig,
    error_handler: Option<ErrorHandler>,
}

fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// Like `with_runtime`, but safe to call from `Drop` impls, which may run
/// during thread teardown.
fn try_with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
    RUNTIME
        .try_with(|rt| rt.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
        .ok()
        .flatten()
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: Graph::new(),
            observers: HashMap::new(),
            owned: HashMap::new(),
            scheduler: UpdateScheduler::new(),
            config: RuntimeConfig::default(),
            error_handler: None,
        }
    }

    // ------------------------------------------------------------------
    // Configuration and inspection
    // ------------------------------------------------------------------

    /// Replace this thread's runtime configuration.
    pub fn configure(config: RuntimeConfig) {
        with_runtime(|rt| rt.config = config);
    }

    pub fn config() -> RuntimeConfig {
        with_runtime(|rt| rt.config.clone())
    }

    /// Install the callback that receives caught effect failures.
    pub fn set_error_handler<F>(handler: F)
    where
        F: Fn(&ReactiveError) + Send + Sync + 'static,
    {
        let previous = with_runtime(|rt| rt.error_handler.replace(Arc::new(handler)));
        drop(previous);
    }

    pub fn clear_error_handler() {
        let previous = with_runtime(|rt| rt.error_handler.take());
        drop(previous);
    }

    /// Describe every live node on this thread.
    pub fn snapshot() -> Vec<NodeInfo> {
        with_runtime(|rt| rt.graph.snapshot())
    }

    pub fn node_count() -> usize {
        with_runtime(|rt| rt.graph.node_count())
    }

    /// Attach a human-readable label to a node, shown in snapshots.
    pub fn set_label(node: NodeId, label: impl Into<String>) {
        let label = label.into();
        with_runtime(|rt| rt.graph.set_label(node, label));
    }

    pub fn state(node: NodeId) -> Option<NodeState> {
        with_runtime(|rt| rt.graph.state(node))
    }

    pub fn dependents(node: NodeId) -> Vec<NodeId> {
        with_runtime(|rt| rt.graph.dependents(node))
    }

    pub fn dependencies(node: NodeId) -> Vec<NodeId> {
        with_runtime(|rt| rt.graph.dependencies(node))
    }

    pub fn is_batching() -> bool {
        with_runtime(|rt| rt.scheduler.is_batching())
    }

    pub fn is_flushing() -> bool {
        with_runtime(|rt| rt.scheduler.is_flushing())
    }

    pub fn pending_effects() -> usize {
        with_runtime(|rt| rt.scheduler.pending())
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub(crate) fn register_source(id: NodeId) {
        with_runtime(|rt| rt.graph.add_node(Node::with_id(id, NodeKind::Source)));
    }

    /// Register a memo or effect. Effects are additionally kept alive by the
    /// runtime until they are released.
    pub(crate) fn register_observer(observer: Arc<dyn Observer>) {
        let id = observer.node_id();
        let kind = observer.kind();
        with_runtime(|rt| {
            rt.graph.add_node(Node::with_id(id, kind));
            rt.observers.insert(id, Arc::downgrade(&observer));
            if kind == NodeKind::Effect {
                rt.owned.insert(id, observer);
            }
        });
        trace!(node = %id, ?kind, "observer registered");
    }

    /// Remove a node and its edges. Returns the runtime's strong reference
    /// for effects so the caller can drop it outside the runtime borrow.
    pub(crate) fn release(id: NodeId) -> Option<Arc<dyn Observer>> {
        try_with_runtime(|rt| {
            rt.graph.remove_node(id);
            rt.observers.remove(&id);
            rt.scheduler.dequeue(id);
            rt.owned.remove(&id)
        })
        .flatten()
    }

    // ------------------------------------------------------------------
    // Tracking and propagation
    // ------------------------------------------------------------------

    /// Record that the running observer read `source`.
    pub(crate) fn track(source: NodeId) {
        if let Some(observer) = ReactiveContext::current_observer() {
            let added = with_runtime(|rt| rt.graph.add_edge(source, observer));
            if added {
                trace!(source = %source, observer = %observer, "dependency tracked");
            }
        }
    }

    /// Prepare an observer for a fresh run: drop every edge from its last
    /// run. Effects are also marked clean up front, so writes they make to
    /// their own inputs queue them again.
    pub(crate) fn begin_run(id: NodeId, kind: NodeKind) {
        with_runtime(|rt| {
            rt.graph.clear_dependencies(id);
            if kind == NodeKind::Effect {
                rt.graph.set_state(id, NodeState::Clean);
            }
        });
    }

    /// Settle a memo after a successful recomputation.
    pub(crate) fn finish_compute(id: NodeId, changed: bool) {
        with_runtime(|rt| {
            rt.graph.set_state(id, NodeState::Clean);
            if changed {
                rt.graph.confirm_changed(id);
            }
        });
    }

    /// Settle a memo whose computation unwound. It becomes clean without
    /// confirming a change, so the next upstream write reaches it again.
    pub(crate) fn abandon_compute(id: NodeId) {
        try_with_runtime(|rt| rt.graph.set_state(id, NodeState::Clean));
        trace!(memo = %id, "memo computation unwound");
    }

    /// Raise `WriteInComputed` if a memo is computing. Writers call this
    /// before touching their value.
    pub(crate) fn assert_writable(source: NodeId) {
        if let Some(memo) = ReactiveContext::computing_memo() {
            raise(ReactiveError::WriteInComputed {
                signal: source,
                memo,
            });
        }
    }

    /// A source changed value: mark its dependents and run effects unless
    /// a batch or flush is open.
    pub(crate) fn notify_changed(source: NodeId) {
        Self::assert_writable(source);
        with_runtime(|rt| {
            for effect in rt.graph.mark_changed(source) {
                rt.scheduler.enqueue(effect);
            }
        });
        Self::schedule_flush();
    }

    /// Force a memo to recompute on its next read.
    pub(crate) fn invalidate(memo: NodeId) {
        with_runtime(|rt| {
            for effect in rt.graph.mark_stale(memo) {
                rt.scheduler.enqueue(effect);
            }
        });
        Self::schedule_flush();
    }

    /// Whether `id` must recompute or re-run.
    ///
    /// A maybe-dirty node asks each memo it read, in read order, to bring
    /// itself up to date; the first one whose value changed turns the node
    /// dirty. If none did, the node is clean again without running.
    pub(crate) fn needs_update(id: NodeId) -> bool {
        match with_runtime(|rt| rt.graph.state(id)) {
            None | Some(NodeState::Clean) => false,
            Some(NodeState::Dirty) => true,
            Some(NodeState::MaybeDirty) => {
                let upstream: SmallVec<[Arc<dyn Observer>; 4]> = with_runtime(|rt| {
                    rt.graph
                        .dependencies(id)
                        .into_iter()
                        .filter(|dep| rt.graph.kind(*dep) == Some(NodeKind::Derived))
                        .filter_map(|dep| rt.observers.get(&dep).and_then(Weak::upgrade))
                        .collect()
                });
                for memo in upstream {
                    memo.update();
                    if with_runtime(|rt| rt.graph.state(id)) == Some(NodeState::Dirty) {
                        return true;
                    }
                }
                with_runtime(|rt| rt.graph.set_state(id, NodeState::Clean));
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Batching, deferral and flushing
    // ------------------------------------------------------------------

    pub(crate) fn enter_batch() -> usize {
        with_runtime(|rt| rt.scheduler.enter_batch())
    }

    pub(crate) fn exit_batch() -> usize {
        try_with_runtime(|rt| rt.scheduler.exit_batch()).unwrap_or(0)
    }

    /// Run `task` now, or once no memo is computing.
    ///
    /// Used for writes that are a side effect of a read, such as a storage
    /// bridge expiring an entry it was asked for.
    pub fn defer(task: impl FnOnce() + 'static) {
        if ReactiveContext::computing_memo().is_none() {
            task();
            return;
        }
        trace!("write deferred until computation finishes");
        with_runtime(|rt| rt.scheduler.defer(Box::new(task)));
    }

    /// Flush if nothing is holding the queue back.
    pub(crate) fn schedule_flush() {
        if ReactiveContext::computing_memo().is_some() {
            return;
        }
        let ready = with_runtime(|rt| rt.scheduler.should_flush());
        if ready {
            Self::flush();
        }
    }

    /// Drain the effect queue to a fixed point.
    ///
    /// Effects dirtied during the flush are appended and run before this
    /// returns. A panicking effect is reported and skipped; engine invariant
    /// violations propagate to the caller.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::FlushLimitExceeded`] when more than
    /// `max_flush_iterations` effects run in one flush.
    pub fn flush() {
        if !with_runtime(|rt| rt.scheduler.begin_flush()) {
            return;
        }
        let _guard = FlushGuard;
        let limit = with_runtime(|rt| rt.config.max_flush_iterations);

        loop {
            Self::run_deferred();

            let Some((id, iteration)) = with_runtime(|rt| rt.scheduler.next()) else {
                break;
            };
            if iteration > limit {
                raise(ReactiveError::FlushLimitExceeded { limit });
            }

            let observer = with_runtime(|rt| rt.observers.get(&id).and_then(Weak::upgrade));
            if let Some(observer) = observer {
                trace!(node = %id, iteration, "flushing effect");
                Self::run_guarded(&observer);
            }
        }
    }

    fn run_deferred() {
        let tasks: Vec<DeferredTask> = with_runtime(|rt| rt.scheduler.take_deferred());
        for task in tasks {
            task();
        }
    }

    /// Run an observer right away, outside the queue. Writes it makes are
    /// flushed once it returns.
    pub(crate) fn run_now(observer: &Arc<dyn Observer>) {
        super::batch::batch(|| Self::run_guarded(observer));
    }

    /// Bring one observer up to date, catching its panic.
    fn run_guarded(observer: &Arc<dyn Observer>) {
        let id = observer.node_id();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            if Self::needs_update(id) {
                observer.update();
            }
        }));

        if let Err(payload) = result {
            // A panic while pulling upstream memos leaves the effect marked;
            // settle it so the next write queues it again
            try_with_runtime(|rt| rt.graph.set_state(id, NodeState::Clean));
            if let Some(fatal) = payload.downcast_ref::<ReactiveError>() {
                if fatal.is_fatal() {
                    panic::resume_unwind(payload);
                }
            }
            let error = ReactiveError::EffectPanicked {
                node: id,
                message: panic_message(payload.as_ref()),
            };
            error!(node = %id, %error, "effect failed");
            Self::report(&error);
        }
    }

    /// Hand a caught error to the installed handler.
    pub(crate) fn report(error: &ReactiveError) {
        let handler = with_runtime(|rt| rt.error_handler.clone());
        match handler {
            Some(handler) => handler(error),
            None => debug!(%error, "no error handler installed"),
        }
    }
}

/// Closes the flush even if an effect unwinds out of it.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let abandoned = try_with_runtime(|rt| {
            let leftover = rt.scheduler.end_flush();
            for id in &leftover {
                rt.graph.set_state(*id, NodeState::Clean);
            }
            leftover.len()
        })
        .unwrap_or(0);
        if abandoned > 0 {
            warn!(abandoned, "flush aborted with effects still queued");
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.graph.node_count())
            .field("observers", &self.observers.len())
            .field("effects", &self.owned.len())
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish()
    }
}
