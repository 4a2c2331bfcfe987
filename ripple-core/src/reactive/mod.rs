//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Ripple's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified. [`State`] groups signals under string keys.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only when it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems.
//! Writes inside [`batch`] reach effects once, after the outermost batch closes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies, and a thread-local [`Runtime`] that owns the
//! dependency graph and the effect queue.

mod batch;
mod context;
mod effect;
mod memo;
mod observer;
mod runtime;
mod scope;
mod signal;
mod state;

pub use batch::{batch, is_batching};
pub use context::{untrack, ReactiveContext};
pub use effect::{effect, effect_with_cleanup, Effect};
pub use memo::{computed, Memo};
pub use observer::{Cleanup, Observer, Reaction};
pub use runtime::{ErrorHandler, Runtime};
pub use scope::EffectScope;
pub use signal::{never_equal, signal, Equality, Signal};
pub use state::State;
