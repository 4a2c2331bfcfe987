//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-run by the
//!    runtime's flush, once per flush no matter how many inputs changed.
//!
//! 3. Before re-running, the effect runs its pending cleanup, drops its old
//!    dependencies and tracks new ones during execution. A branch not taken
//!    this run keeps no subscription.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos are released when their last handle drops; effects live until
//!   they are disposed.
//!
//! # Cleanup
//!
//! An effect body is a [`Reaction`]. Its `cleanup` runs before each re-run
//! and its `dispose` runs once when the effect is disposed. Closures that
//! return a teardown closure are adapted with [`Effect::with_cleanup`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::batch::batch;
use super::context::{untrack, ReactiveContext};
use super::observer::{CleanupReaction, FnReaction, Observer, Reaction};
use super::runtime::Runtime;
use crate::error::{raise, ReactiveError};
use crate::graph::{NodeId, NodeKind};

struct EffectInner {
    id: NodeId,
    reaction: Mutex<Box<dyn Reaction>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn run(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Some(mut reaction) = self.reaction.try_lock() else {
            raise(ReactiveError::ReentrantRun { node: self.id });
        };

        untrack(|| reaction.cleanup());
        Runtime::begin_run(self.id, NodeKind::Effect);
        {
            let _ctx = ReactiveContext::enter(self.id, NodeKind::Effect);
            reaction.run();
        }
        self.run_count.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(effect = %self.id, "effect ran");

        // Disposed by its own body: teardown was left to us
        if self.disposed.load(Ordering::SeqCst) {
            untrack(|| reaction.dispose());
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut reaction) = self.reaction.try_lock() {
            untrack(|| reaction.dispose());
        }
        drop(Runtime::release(self.id));
        tracing::trace!(effect = %self.id, "effect disposed");
    }
}

impl Observer for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Effect
    }

    fn update(&self) {
        self.run();
    }

    fn dispose(&self) {
        EffectInner::dispose(self);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Dropping an `Effect` handle does not stop it; call [`Effect::dispose`]
/// or let an [`EffectScope`](super::EffectScope) own it.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let c = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::from_reaction(FnReaction::new(run))
    }

    /// Create an effect whose body returns the cleanup for the run it just
    /// made. The cleanup runs before the next run and on disposal.
    pub fn with_cleanup<F, C>(run: F) -> Self
    where
        F: FnMut() -> C + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::from_reaction(CleanupReaction::new(run))
    }

    /// Create an effect from an explicit [`Reaction`].
    pub fn from_reaction<R: Reaction>(reaction: R) -> Self {
        let effect = Self::new_lazy_reaction(reaction);
        let observer: Arc<dyn Observer> = effect.inner.clone();
        Runtime::run_now(&observer);
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until the first [`execute`](Self::execute).
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::new_lazy_reaction(FnReaction::new(run))
    }

    fn new_lazy_reaction<R: Reaction>(reaction: R) -> Self {
        let inner = Arc::new(EffectInner {
            id: NodeId::new(),
            reaction: Mutex::new(Box::new(reaction)),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        Runtime::register_observer(inner.clone());
        Self { inner }
    }

    /// Name this effect in runtime snapshots.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        Runtime::set_label(self.inner.id, label);
        self
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect now, whether or not its inputs changed.
    ///
    /// Writes it makes are flushed when it returns. Unlike a scheduled run,
    /// a panic in the body reaches the caller.
    pub fn execute(&self) -> Result<(), ReactiveError> {
        if self.is_disposed() {
            return Err(ReactiveError::Disposed {
                node: self.inner.id,
            });
        }
        batch(|| self.inner.run());
        Ok(())
    }

    /// Dispose of the effect.
    ///
    /// Runs the reaction's teardown, unsubscribes from every dependency and
    /// removes the effect from the runtime. After disposal, the effect will
    /// not run again. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependencies(self.inner.id).len()
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("run_count", &self.run_count())
            .finish()
    }
}

/// Register an effect that runs now and whenever its inputs change.
pub fn effect<F>(run: F) -> Effect
where
    F: FnMut() + Send + 'static,
{
    Effect::new(run)
}

/// Like [`effect`], for bodies that return a cleanup closure.
pub fn effect_with_cleanup<F, C>(run: F) -> Effect
where
    F: FnMut() -> C + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    Effect::with_cleanup(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
