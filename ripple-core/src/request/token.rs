//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    aborted: AtomicBool,
    notify: Notify,
}

/// A cancellation signal handed to an in-flight operation.
///
/// Aborting never interrupts running code: the operation either polls
/// [`is_aborted`](Self::is_aborted) or awaits [`aborted`](Self::aborted).
/// Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    state: Arc<TokenState>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Returns false if it was already signalled.
    pub fn abort(&self) -> bool {
        let first = !self.state.aborted.swap(true, Ordering::SeqCst);
        if first {
            self.state.notify.notify_waiters();
        }
        first
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the token is aborted.
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before checking, so an abort in between is not missed
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Identity of one attempt in a [`RequestSlot`](super::RequestSlot).
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: u64,
    pub token: AbortToken,
}
