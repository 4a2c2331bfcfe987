//! Request Slot
//!
//! A slot holds the reactive state of one logical async operation (data,
//! error, status) and keeps out-of-order completions from overwriting it.
//!
//! # How It Works
//!
//! 1. `start` issues a ticket whose id is one more than the last one, and
//!    aborts the token of the ticket it replaces.
//!
//! 2. `complete(id, result)` commits only if `id` is still the newest
//!    ticket. Anything older is stale: logged, passed to the `on_stale`
//!    hook, and dropped, whether it succeeded or failed.
//!
//! 3. `abort` signals the current ticket's token and marks the slot
//!    aborted. The error cell is left alone: an abort is not a failure.
//!
//! `execute` wraps all three around a future, racing it against its token.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::token::{AbortToken, Ticket};
use crate::error::ReactiveError;
use crate::reactive::{batch, never_equal, Signal};

/// Where a slot is in its request lifecycle. Every state but `Idle` names
/// the ticket it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "id", rename_all = "snake_case")]
pub enum RequestStatus {
    Idle,
    Pending(u64),
    Resolved(u64),
    Rejected(u64),
    Aborted(u64),
}

impl RequestStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn ticket(&self) -> Option<u64> {
        match *self {
            Self::Idle => None,
            Self::Pending(id) | Self::Resolved(id) | Self::Rejected(id) | Self::Aborted(id) => Some(id),
        }
    }
}

/// What `complete` did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Committed,
    /// A newer ticket exists; the result was dropped.
    Stale,
    /// The ticket was aborted; the result was dropped.
    Aborted,
}

/// How an `execute` or `refetch` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T, E> {
    Resolved(T),
    Rejected(E),
    Stale,
    Aborted,
}

type BoxedFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>>>>;
type Operation<T, E> = Arc<dyn Fn(AbortToken) -> BoxedFuture<T, E> + Send + Sync>;
type StaleHook = Arc<dyn Fn(u64) + Send + Sync>;

struct SlotInner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    data: Signal<Option<T>>,
    error: Signal<Option<E>>,
    status: Signal<RequestStatus>,
    request_id: Signal<u64>,
    /// Newest ticket issued.
    current: AtomicU64,
    /// Token of the newest ticket, until it settles.
    token: Mutex<Option<AbortToken>>,
    last_op: Mutex<Option<Operation<T, E>>>,
    on_stale: RwLock<Option<StaleHook>>,
}

/// Race-safe reactive state for one async operation.
///
/// ```rust,ignore
/// let user: RequestSlot<User, ApiError> = RequestSlot::new();
///
/// let slot = user.clone();
/// let _e = effect(move || render(slot.data(), slot.is_loading()));
///
/// user.execute(move |token| fetch_user(id, token)).await;
/// ```
pub struct RequestSlot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Arc<SlotInner<T, E>>,
}

impl<T, E> RequestSlot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                // Every commit is news, equal payload or not
                data: Signal::with_equality(None, never_equal),
                error: Signal::with_equality(None, never_equal),
                status: Signal::new(RequestStatus::Idle),
                request_id: Signal::new(0),
                current: AtomicU64::new(0),
                token: Mutex::new(None),
                last_op: Mutex::new(None),
                on_stale: RwLock::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Tracked state
    // ------------------------------------------------------------------

    pub fn data(&self) -> Option<T> {
        self.inner.data.get()
    }

    pub fn error(&self) -> Option<E> {
        self.inner.error.get()
    }

    pub fn status(&self) -> RequestStatus {
        self.inner.status.get()
    }

    /// Id of the newest ticket, 0 before the first start.
    pub fn request_id(&self) -> u64 {
        self.inner.request_id.get()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.status.with(RequestStatus::is_pending)
    }

    /// Whether `id` is the newest ticket. Untracked.
    pub fn is_current(&self, id: u64) -> bool {
        self.inner.current.load(Ordering::SeqCst) == id
    }

    /// Observe discarded results, for debugging.
    pub fn on_stale<F>(&self, hook: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        *self.inner.on_stale.write() = Some(Arc::new(hook));
    }

    // ------------------------------------------------------------------
    // Ticket protocol
    // ------------------------------------------------------------------

    /// Issue a new ticket, superseding and aborting the previous one.
    pub fn start(&self) -> Ticket {
        let token = AbortToken::new();
        let previous = self.inner.token.lock().replace(token.clone());
        if let Some(previous) = previous {
            previous.abort();
        }
        let id = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;

        batch(|| {
            self.inner.request_id.set(id);
            self.inner.error.set(None);
            self.inner.status.set(RequestStatus::Pending(id));
        });
        trace!(ticket = id, "request started");
        Ticket { id, token }
    }

    /// Commit `result` if `id` is still the newest, non-aborted ticket.
    pub fn complete(&self, id: u64, result: Result<T, E>) -> Commit {
        if !self.is_current(id) {
            debug!(ticket = id, current = self.inner.current.load(Ordering::SeqCst), "stale result discarded");
            let hook = self.inner.on_stale.read().clone();
            if let Some(hook) = hook {
                hook(id);
            }
            return Commit::Stale;
        }

        let token = self.inner.token.lock().take();
        if token.as_ref().is_some_and(AbortToken::is_aborted) {
            debug!(ticket = id, "result of aborted request discarded");
            return Commit::Aborted;
        }

        batch(|| match result {
            Ok(value) => {
                self.inner.data.set(Some(value));
                self.inner.error.set(None);
                self.inner.status.set(RequestStatus::Resolved(id));
            }
            Err(error) => {
                self.inner.error.set(Some(error));
                self.inner.status.set(RequestStatus::Rejected(id));
            }
        });
        trace!(ticket = id, "request settled");
        Commit::Committed
    }

    /// Abort the request in flight, if any. Data and error are untouched.
    pub fn abort(&self) -> bool {
        // The token stays in place so a late `complete` sees the abort
        let aborted = self
            .inner
            .token
            .lock()
            .as_ref()
            .is_some_and(AbortToken::abort);
        if !aborted {
            return false;
        }
        let id = self.inner.current.load(Ordering::SeqCst);
        self.inner.status.set(RequestStatus::Aborted(id));
        debug!(ticket = id, "request aborted");
        true
    }

    /// Abort anything in flight and return to `Idle` with no data or error.
    /// Ticket ids keep increasing across resets.
    pub fn reset(&self) {
        // Aborted in place, like `abort`, so the in-flight ticket cannot
        // commit over the reset
        if let Some(token) = self.inner.token.lock().as_ref() {
            token.abort();
        }
        batch(|| {
            self.inner.data.set(None);
            self.inner.error.set(None);
            self.inner.status.set(RequestStatus::Idle);
        });
    }

    // ------------------------------------------------------------------
    // Running operations
    // ------------------------------------------------------------------

    /// Run `op` under a fresh ticket and commit its outcome if still
    /// current. The operation is remembered for [`refetch`](Self::refetch).
    pub async fn execute<F, Fut>(&self, op: F) -> Completion<T, E>
    where
        F: Fn(AbortToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        let op: Operation<T, E> = Arc::new(move |token| Box::pin(op(token)) as BoxedFuture<T, E>);
        *self.inner.last_op.lock() = Some(op.clone());
        self.run(op).await
    }

    /// Run the last executed operation again.
    pub async fn refetch(&self) -> Result<Completion<T, E>, ReactiveError> {
        let op = self
            .inner
            .last_op
            .lock()
            .clone()
            .ok_or(ReactiveError::NothingToRefetch)?;
        Ok(self.run(op).await)
    }

    async fn run(&self, op: Operation<T, E>) -> Completion<T, E> {
        let ticket = self.start();
        let pending = op(ticket.token.clone());

        let outcome = tokio::select! {
            biased;
            _ = ticket.token.aborted() => None,
            result = pending => Some(result),
        };

        let Some(result) = outcome else {
            return Completion::Aborted;
        };
        match (self.complete(ticket.id, result.clone()), result) {
            (Commit::Committed, Ok(value)) => Completion::Resolved(value),
            (Commit::Committed, Err(error)) => Completion::Rejected(error),
            (Commit::Stale, _) => Completion::Stale,
            (Commit::Aborted, _) => Completion::Aborted,
        }
    }
}

impl<T, E> Default for RequestSlot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for RequestSlot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Debug for RequestSlot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSlot")
            .field("status", &self.inner.status.get_untracked())
            .field("current", &self.inner.current.load(Ordering::SeqCst))
            .finish()
    }
}
