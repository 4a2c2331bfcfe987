//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the observer onto the stack. When the computation completes, the guard
//! pops it.
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo). `untrack` pushes an opaque entry, so reads inside it
//! see no active observer even when an effect is running underneath.

use std::cell::RefCell;

use crate::graph::{NodeId, NodeKind};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContextEntry {
    /// `None` for an untracked section.
    observer: Option<(NodeId, NodeKind)>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    entry: ContextEntry,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given observer.
    ///
    /// While this context is active, any signals that are read will
    /// register the observer as a dependent.
    pub fn enter(observer: NodeId, kind: NodeKind) -> Self {
        Self::push(ContextEntry {
            observer: Some((observer, kind)),
        })
    }

    /// Enter a section in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(ContextEntry { observer: None })
    }

    fn push(entry: ContextEntry) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self { entry }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_observer().is_some()
    }

    /// Get the observer that a read right now would subscribe.
    pub fn current_observer() -> Option<NodeId> {
        Self::top().map(|(id, _)| id)
    }

    /// Get the kind of the observer that is currently tracking.
    pub fn current_kind() -> Option<NodeKind> {
        Self::top().map(|(_, kind)| kind)
    }

    fn top() -> Option<(NodeId, NodeKind)> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
    }

    /// The innermost memo currently computing, tracked or not.
    pub fn computing_memo() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack.borrow().iter().rev().find_map(|entry| match entry.observer {
                Some((id, NodeKind::Derived)) => Some(id),
                _ => None,
            })
        })
    }

    /// Whether `observer` is anywhere on the stack.
    pub fn is_running(observer: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| matches!(entry.observer, Some((id, _)) if id == observer))
        })
    }

    /// Number of entries on the stack, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // try_with: guards may outlive the stack during thread teardown
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            debug_assert_eq!(
                popped,
                Some(self.entry),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.entry,
                popped
            );
        });
    }
}

/// Run `f` without recording any dependencies.
///
/// ```rust,ignore
/// effect(move || {
///     let a = a.get();                 // tracked
///     let b = untrack(|| b.get());     // not tracked
/// });
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}
