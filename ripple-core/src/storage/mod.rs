//! External Store Bridge
//!
//! Exposes a non-reactive key/value resource through the reactive graph.
//!
//! - [`StorageBackend`] is the raw resource: read, write, delete and list
//!   by prefix. [`MemoryBackend`] is the in-process implementation.
//! - [`StoreBridge`] scopes a backend to one namespace and turns every
//!   access into a tracked read or a batched write of its version signal.
//! - Values are persisted as an [`Envelope`] encoded by a [`Codec`], which
//!   carries the optional expiry checked against a [`Clock`].
//! - [`SyncHub`] carries change events between bridges sharing a backend.

mod backend;
mod bridge;
mod clock;
mod codec;
mod sync;

pub use backend::{MemoryBackend, StorageBackend};
pub use bridge::{BridgeBuilder, StorageErrorHandler, StoreBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, Envelope};
pub use sync::{StorageEvent, SyncHub};
