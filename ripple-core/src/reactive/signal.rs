//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: one reactive cell. It
//! holds a value and a node in the runtime's dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    runtime records an edge from the signal to that context.
//!
//! 2. When a signal's value changes, its dependents are marked dirty and
//!    dependent effects are scheduled.
//!
//! 3. Writing a value equal to the current one is a no-op. Equality is
//!    `PartialEq` by default and can be replaced per signal.
//!
//! # Thread Safety
//!
//! The value is protected by a `parking_lot::RwLock`, so handles are
//! `Send + Sync`. Dependency bookkeeping belongs to the thread-local
//! runtime of the thread that created the signal.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::Runtime;
use crate::graph::NodeId;

/// Decides whether a write is a change. Returns true when equal.
pub type Equality<T> = fn(&T, &T) -> bool;

/// Equality that never holds: every write notifies.
pub fn never_equal<T>(_: &T, _: &T) -> bool {
    false
}

struct SignalInner<T> {
    id: NodeId,
    value: RwLock<T>,
    equals: Equality<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        drop(Runtime::release(self.id));
    }
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, <T as PartialEq>::eq)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal that uses `equals` to decide whether a write changes
    /// anything.
    pub fn with_equality(value: T, equals: Equality<T>) -> Self {
        let id = NodeId::new();
        Runtime::register_source(id);
        Self {
            inner: Arc::new(SignalInner {
                id,
                value: RwLock::new(value),
                equals,
            }),
        }
    }

    /// Name this signal in runtime snapshots.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        Runtime::set_label(self.inner.id, label);
        self
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.id);
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it. Tracked like `get`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.id);
        f(&*self.inner.value.read())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers if it differs.
    ///
    /// # Panics
    ///
    /// Panics with `ReactiveError::WriteInComputed` when called while a
    /// memo is computing.
    pub fn set(&self, value: T) {
        Runtime::assert_writable(self.inner.id);
        {
            let mut guard = self.inner.value.write();
            if (self.inner.equals)(&*guard, &value) {
                return;
            }
            *guard = value;
        }
        Runtime::notify_changed(self.inner.id);
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&*guard)
        };
        self.set(new_value);
    }

    /// Mutate the value in place. Subscribers are notified if the result
    /// differs from the value before the call.
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        Runtime::assert_writable(self.inner.id);
        let changed = {
            let mut guard = self.inner.value.write();
            let before = guard.clone();
            f(&mut *guard);
            !(self.inner.equals)(&before, &*guard)
        };
        if changed {
            Runtime::notify_changed(self.inner.id);
        }
    }

    /// Notify subscribers without changing the value.
    pub fn trigger(&self) {
        Runtime::notify_changed(self.inner.id);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::dependents(self.inner.id).len()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a signal. Shorthand for [`Signal::new`].
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::reactive::ReactiveContext;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update_and_modify() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);

        let list = Signal::new(vec![1]);
        list.modify(|v| v.push(2));
        assert_eq!(list.get(), vec![1, 2]);
    }

    #[test]
    fn read_inside_context_subscribes() {
        let signal = Signal::new(0);
        // Stand-in observer node; only its edges matter here
        let observer = NodeId::new();
        Runtime::register_source(observer);

        assert_eq!(signal.subscriber_count(), 0);
        {
            let _ctx = ReactiveContext::enter(observer, NodeKind::Effect);
            signal.get();
            signal.get();
        }
        assert_eq!(signal.subscriber_count(), 1);

        // Untracked reads never subscribe
        let other = Signal::new(0);
        {
            let _ctx = ReactiveContext::enter(observer, NodeKind::Effect);
            other.get_untracked();
        }
        assert_eq!(other.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn dropping_last_handle_releases_node() {
        let before = Runtime::node_count();
        let signal = Signal::new(1).with_label("temp");
        assert_eq!(Runtime::node_count(), before + 1);
        assert!(Runtime::snapshot()
            .iter()
            .any(|info| info.label.as_deref() == Some("temp")));

        let clone = signal.clone();
        drop(signal);
        assert_eq!(Runtime::node_count(), before + 1);
        drop(clone);
        assert_eq!(Runtime::node_count(), before);
    }

    #[test]
    fn custom_equality_controls_notification() {
        // Case-insensitive: only a different word is a change
        fn same_word(a: &String, b: &String) -> bool {
            a.eq_ignore_ascii_case(b)
        }
        let word = Signal::with_equality("hello".to_string(), same_word);
        word.set("HELLO".to_string());
        assert_eq!(word.get(), "hello");
        word.set("world".to_string());
        assert_eq!(word.get(), "world");

        let always = Signal::with_equality(1, never_equal);
        always.set(1);
        assert_eq!(always.get(), 1);
    }

    #[test]
    fn rejected_write_leaves_value_unchanged() {
        let signal = Signal::new(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(NodeId::new(), NodeKind::Derived);
            signal.set(5);
        }));
        assert!(result.is_err());
        assert_eq!(signal.get_untracked(), 0);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(NodeId::new(), NodeKind::Derived);
            signal.modify(|v| *v += 1);
        }));
        assert!(result.is_err());
        assert_eq!(signal.get_untracked(), 0);
    }
}
