//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a signal it read changes, the memo is marked dirty. When a memo it
//!    read is invalidated, it is marked "maybe dirty".
//!
//! 4. On next access, a maybe-dirty memo first brings its own upstream memos
//!    up to date. If none of them changed value, it is clean again without
//!    recomputing.
//!
//! 5. If the recomputed value equals the cached one, dependents are not
//!    dirtied: change propagation stops here.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Restrictions
//!
//! Computations must be pure. Writing a signal while a memo computes, or
//! reading a memo from its own computation, is a fatal error.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::observer::Observer;
use super::runtime::Runtime;
use super::signal::Equality;
use crate::error::{raise, ReactiveError};
use crate::graph::{NodeId, NodeKind, NodeState};

struct MemoInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    /// Set when a computation unwound; the cache is not trusted until the
    /// next successful run.
    stale: AtomicBool,
    equals: Equality<T>,
}

/// Settles a memo whose computation unwound. The node goes back to clean
/// so later writes reach it and its readers again, and the memo is flagged
/// stale so the next read recomputes.
struct Unwinding<'a> {
    id: NodeId,
    stale: &'a AtomicBool,
    armed: bool,
}

impl Drop for Unwinding<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.stale.store(true, Ordering::SeqCst);
            Runtime::abandon_compute(self.id);
        }
    }
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Recompute the memo's value.
    ///
    /// This runs the computation function within a reactive context to
    /// track dependencies.
    fn recompute(&self) -> T {
        Runtime::begin_run(self.id, NodeKind::Derived);

        let mut unwinding = Unwinding {
            id: self.id,
            stale: &self.stale,
            armed: true,
        };
        let new_value = {
            let _ctx = ReactiveContext::enter(self.id, NodeKind::Derived);
            (self.compute)()
        };
        unwinding.armed = false;
        self.stale.store(false, Ordering::SeqCst);

        let changed = {
            let mut cached = self.value.write();
            let changed = match cached.as_ref() {
                Some(old) => !(self.equals)(old, &new_value),
                None => true,
            };
            if changed {
                *cached = Some(new_value.clone());
            }
            changed
        };

        Runtime::finish_compute(self.id, changed);
        tracing::trace!(memo = %self.id, changed, "memo recomputed");
        new_value
    }

    fn current(&self) -> T {
        if ReactiveContext::is_running(self.id) {
            raise(ReactiveError::CycleDetected { node: self.id });
        }

        let cached = if Runtime::needs_update(self.id) || self.stale.load(Ordering::SeqCst) {
            None
        } else {
            self.value.read().clone()
        };
        cached.unwrap_or_else(|| self.recompute())
    }
}

impl<T> Observer for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Derived
    }

    fn update(&self) {
        if Runtime::needs_update(self.id) || self.stale.load(Ordering::SeqCst) {
            self.recompute();
        }
    }

    fn dispose(&self) {}
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        drop(Runtime::release(self.id));
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync.
///
/// `Memo::new` additionally needs `PartialEq` to detect when the computed
/// value actually changed (some memos might return the same value even if
/// inputs changed).
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_equality(compute, <T as PartialEq>::eq)
    }
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a memo with a custom notion of "unchanged".
    pub fn with_equality<F>(compute: F, equals: Equality<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            stale: AtomicBool::new(false),
            equals,
        });
        Runtime::register_observer(inner.clone());
        Self { inner }
    }

    /// Name this memo in runtime snapshots.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        Runtime::set_label(self.inner.id, label);
        self
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value. Inside a
    /// reactive context it also subscribes the running computation.
    ///
    /// # Panics
    ///
    /// Panics with `ReactiveError::CycleDetected` when called from the
    /// memo's own computation.
    pub fn get(&self) -> T {
        // Subscribe first, so a reader stays attached even if the
        // computation panics
        Runtime::track(self.inner.id);
        let value = self.inner.current();
        if ReactiveContext::depth() == 0 {
            // Apply writes deferred while computing
            Runtime::schedule_flush();
        }
        value
    }

    /// Get the current value without subscribing the running computation.
    pub fn get_untracked(&self) -> T {
        self.inner.current()
    }

    /// Mark the memo as needing recomputation on next read.
    pub fn invalidate(&self) {
        Runtime::invalidate(self.inner.id);
    }

    /// Get the current dirty state.
    pub fn state(&self) -> NodeState {
        Runtime::state(self.inner.id).unwrap_or(NodeState::Dirty)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependents(self.inner.id).len()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a lazily recomputed derived value. Shorthand for [`Memo::new`].
pub fn computed<T, F>(compute: F) -> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
