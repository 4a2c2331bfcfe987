//! Change notifications between bridges.
//!
//! A [`SyncHub`] plays the role of the browser's storage events: every
//! bridge attached to it publishes its writes and hears everyone else's.
//! Bridges tag events with their origin and drop their own echoes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One write made by some bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub namespace: String,
    /// `None` when the whole namespace was cleared.
    pub key: Option<String>,
    /// Identity of the bridge that made the write.
    pub origin: u64,
}

/// Shared channel for [`StorageEvent`]s.
#[derive(Debug, Clone)]
pub struct SyncHub {
    sender: broadcast::Sender<StorageEvent>,
}

impl SyncHub {
    /// `capacity` events may be buffered per subscriber before the slowest
    /// one starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers will see the event.
    pub fn publish(&self, event: StorageEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(64)
    }
}
