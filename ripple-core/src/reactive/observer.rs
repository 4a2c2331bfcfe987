//! Observer types for the reactive system.
//!
//! An observer is any computation that depends on reactive values: memos
//! and effects. The runtime only knows observers through the [`Observer`]
//! trait; user-supplied side effects plug in through [`Reaction`].

use crate::graph::{NodeId, NodeKind};

/// A computation the runtime can bring up to date.
///
/// The runtime keeps weak references to memos and strong references to
/// live effects, keyed by their node ID.
pub trait Observer: Send + Sync {
    /// The graph node backing this observer.
    fn node_id(&self) -> NodeId;

    /// `Derived` for memos (lazy), `Effect` for effects (eager).
    fn kind(&self) -> NodeKind;

    /// Bring the observer up to date: a memo recomputes if its inputs
    /// changed, an effect re-runs.
    fn update(&self);

    /// Tear the observer down. After this it never runs again.
    fn dispose(&self);
}

/// The body of an effect.
///
/// `run` executes inside a tracking context, so every signal or memo it
/// reads becomes a dependency. `cleanup` runs untracked before every re-run;
/// `dispose` runs untracked exactly once, when the effect is disposed.
///
/// ```rust,ignore
/// struct Title { title: Signal<String>, out: Arc<Mutex<String>> }
///
/// impl Reaction for Title {
///     fn run(&mut self) { *self.out.lock() = self.title.get(); }
///     fn dispose(&mut self) { self.out.lock().clear(); }
/// }
///
/// let effect = Effect::from_reaction(Title { .. });
/// ```
pub trait Reaction: Send + 'static {
    fn run(&mut self);

    fn cleanup(&mut self) {}

    fn dispose(&mut self);
}

/// Boxed teardown returned by an effect body.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// A reaction built from a plain closure with no teardown.
pub(crate) struct FnReaction<F> {
    run: F,
}

impl<F> FnReaction<F> {
    pub(crate) fn new(run: F) -> Self {
        Self { run }
    }
}

impl<F> Reaction for FnReaction<F>
where
    F: FnMut() + Send + 'static,
{
    fn run(&mut self) {
        (self.run)();
    }

    fn dispose(&mut self) {}
}

/// A reaction whose closure returns the cleanup for the run it just made.
pub(crate) struct CleanupReaction<F> {
    run: F,
    pending: Option<Cleanup>,
}

impl<F> CleanupReaction<F> {
    pub(crate) fn new(run: F) -> Self {
        Self { run, pending: None }
    }
}

impl<F, C> Reaction for CleanupReaction<F>
where
    F: FnMut() -> C + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    fn run(&mut self) {
        let cleanup = (self.run)();
        self.pending = Some(Box::new(cleanup));
    }

    fn cleanup(&mut self) {
        if let Some(cleanup) = self.pending.take() {
            cleanup();
        }
    }

    fn dispose(&mut self) {
        self.cleanup();
    }
}
