//! Ripple Core
//!
//! This crate provides a fine-grained reactive state runtime. It implements:
//!
//! - Reactive primitives (signals, memos, effects) with automatic dependency
//!   tracking
//! - Glitch-free batching of writes and a fixed-point effect scheduler
//! - A storage bridge that makes an external key/value store observable
//! - Request versioning that keeps stale async results out of reactive state
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, tracking context and runtime
//! - `graph`: Dependency graph arena and update scheduler
//! - `storage`: Storage backends and the version+keyset bridge
//! - `request`: Tickets, abort tokens and request slots
//! - `config`, `error`: Serde configuration and error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{batch, computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(1);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = computed(move || c.get() * 2);
//!
//! // Create an effect
//! let (c, d) = (count.clone(), doubled.clone());
//! let logger = effect(move || {
//!     println!("Count: {}, Doubled: {}", c.get(), d.get());
//! });
//!
//! // Both writes reach the effect once
//! batch(|| {
//!     count.set(2);
//!     count.set(5);
//! });
//! // Prints: "Count: 5, Doubled: 10"
//! logger.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod request;
pub mod storage;

pub use config::{BridgeConfig, RuntimeConfig};
pub use error::{Error, ReactiveError, Result, StorageError};
