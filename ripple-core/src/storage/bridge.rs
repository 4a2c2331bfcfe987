//! Storage Bridge
//!
//! Makes a namespaced key/value backend observable by the reactive graph
//! without a signal per entry.
//!
//! # How It Works
//!
//! The bridge owns two signals: a `version` counter and a snapshot of the
//! namespace's keys.
//!
//! 1. Every read (`get`, `has`) first reads `version`, so the running
//!    computation depends on the namespace as a whole.
//!
//! 2. Every write (`set`, `remove`, `clear`) mutates the backend, then in a
//!    single batch bumps `version` and rescans the keys. A `clear` removing
//!    many entries still reaches each effect once.
//!
//! 3. A read that finds an expired entry treats it as absent, deletes it and
//!    bumps `version` like a removal would. Inside a memo the deletion waits
//!    until the computation is over.
//!
//! Backend failures never unwind into the graph. They are logged, passed to
//! the `on_error` callback, and returned from write operations.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::{debug, warn};

use super::backend::StorageBackend;
use super::clock::{duration_ms, Clock, SystemClock};
use super::codec::Envelope;
use super::sync::{StorageEvent, SyncHub};
use crate::config::BridgeConfig;
use crate::error::StorageError;
use crate::reactive::{batch, untrack, Runtime, Signal};

/// Callback receiving backend and encoding failures.
pub type StorageErrorHandler = Arc<dyn Fn(&StorageError) + Send + Sync>;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

struct SyncLink {
    hub: SyncHub,
    receiver: tokio::sync::Mutex<Receiver<StorageEvent>>,
}

struct BridgeCore {
    backend: Arc<dyn StorageBackend>,
    config: BridgeConfig,
    prefix: String,
    clock: Arc<dyn Clock>,
    version: Signal<u64>,
    keys: Signal<BTreeSet<String>>,
    on_error: RwLock<Option<StorageErrorHandler>>,
    origin: u64,
    sync: Option<SyncLink>,
}

impl BridgeCore {
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn report(&self, error: &StorageError) {
        warn!(namespace = %self.config.namespace, %error, "storage operation failed");
        let handler = self.on_error.read().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }

    fn checked<T>(&self, result: Result<T, StorageError>) -> Result<T, StorageError> {
        if let Err(error) = &result {
            self.report(error);
        }
        result
    }

    /// Raw lookup and decode, untracked. Failures read as absent.
    fn load<V: DeserializeOwned>(&self, key: &str) -> Option<Envelope<V>> {
        let full = self.full_key(key);
        let bytes = self.checked(self.backend.read_raw(&full)).ok()??;
        self.checked(self.config.codec.decode(&full, &bytes)).ok()
    }

    fn scan_keys(&self) -> BTreeSet<String> {
        match self.checked(self.backend.list_raw_keys(&self.prefix)) {
            Ok(raw) => strip_prefix(&self.prefix, raw),
            Err(_) => self.keys.get_untracked(),
        }
    }

    /// Publish one change to the graph: one version bump and a fresh key
    /// snapshot, seen by effects in a single flush.
    fn refresh(&self) {
        let keys = self.scan_keys();
        batch(|| {
            self.version.update(|v| v + 1);
            self.keys.set(keys);
        });
        debug!(
            namespace = %self.config.namespace,
            version = self.version.get_untracked(),
            "storage version bumped"
        );
    }

    /// A local write landed: refresh, then tell the other bridges.
    fn commit(&self, key: Option<&str>) {
        self.refresh();
        if let Some(link) = &self.sync {
            link.hub.publish(StorageEvent {
                namespace: self.config.namespace.clone(),
                key: key.map(str::to_owned),
                origin: self.origin,
            });
        }
    }

    /// Delete `key` if it is still present and expired.
    fn expire(&self, key: &str) {
        let still_expired = self
            .load::<IgnoredAny>(key)
            .is_some_and(|envelope| envelope.is_expired(self.clock.now_ms()));
        if !still_expired {
            return;
        }
        let full = self.full_key(key);
        if let Ok(true) = self.checked(self.backend.delete_raw(&full)) {
            debug!(namespace = %self.config.namespace, key, "expired entry removed");
            self.commit(Some(key));
        }
    }

    fn accepts(&self, event: &StorageEvent) -> bool {
        event.origin != self.origin && event.namespace == self.config.namespace
    }
}

fn strip_prefix(prefix: &str, raw: Vec<String>) -> BTreeSet<String> {
    raw.into_iter()
        .filter_map(|full| full.strip_prefix(prefix).map(str::to_owned))
        .collect()
}

/// A reactive view over one namespace of a [`StorageBackend`].
///
/// Clones share the same signals and backend.
///
/// ```rust,ignore
/// let prefs = StoreBridge::new(MemoryBackend::new(), BridgeConfig::new("prefs"))?;
/// let p = prefs.clone();
/// let _e = effect(move || println!("theme = {:?}", p.get::<String>("theme")));
/// prefs.set("theme", "dark")?; // the effect re-runs
/// ```
#[derive(Clone)]
pub struct StoreBridge {
    core: Arc<BridgeCore>,
}

impl StoreBridge {
    /// # Errors
    ///
    /// Fails with [`StorageError::InvalidNamespace`] when the namespace
    /// could overlap another one, see [`BridgeConfig::validate`].
    pub fn new(backend: impl StorageBackend + 'static, config: BridgeConfig) -> Result<Self, StorageError> {
        Self::builder(backend, config).build()
    }

    pub fn builder(backend: impl StorageBackend + 'static, config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder {
            backend: Arc::new(backend),
            config,
            clock: Arc::new(SystemClock),
            hub: None,
        }
    }

    /// Install the failure callback, replacing any previous one.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&StorageError) + Send + Sync + 'static,
    {
        *self.core.on_error.write() = Some(Arc::new(handler));
    }

    pub fn namespace(&self) -> &str {
        &self.core.config.namespace
    }

    /// Identity stamped on this bridge's sync events.
    pub fn origin(&self) -> u64 {
        self.core.origin
    }

    /// Change counter for the namespace. Tracked.
    pub fn version(&self) -> u64 {
        self.core.version.get()
    }

    /// Read a value. Missing, expired, unreadable and undecodable entries
    /// all read as `None`.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        self.core.version.get();
        let envelope = self.core.load::<V>(key)?;
        if envelope.is_expired(self.core.clock.now_ms()) {
            self.expire_later(key);
            return None;
        }
        Some(envelope.value)
    }

    /// Whether a live entry exists under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.core.version.get();
        match self.core.load::<IgnoredAny>(key) {
            Some(envelope) if envelope.is_expired(self.core.clock.now_ms()) => {
                self.expire_later(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Keys of the namespace, without the prefix, sorted. Tracked on the
    /// key snapshot only.
    pub fn keys(&self) -> Vec<String> {
        self.core.keys.with(|keys| keys.iter().cloned().collect())
    }

    /// Store a value, expiring after the configured default TTL if any.
    pub fn set<V: Serialize>(&self, key: &str, value: V) -> Result<(), StorageError> {
        let ttl = self.core.config.default_ttl_ms;
        self.write(key, value, ttl)
    }

    /// Store a value that reads as absent once `ttl` has elapsed.
    pub fn set_with_ttl<V: Serialize>(&self, key: &str, value: V, ttl: Duration) -> Result<(), StorageError> {
        self.write(key, value, Some(duration_ms(ttl)))
    }

    fn write<V: Serialize>(&self, key: &str, value: V, ttl_ms: Option<u64>) -> Result<(), StorageError> {
        let core = &self.core;
        let full = core.full_key(key);
        let envelope = Envelope::new(value, core.clock.now_ms(), ttl_ms);
        let bytes = core.checked(core.config.codec.encode(&full, &envelope))?;
        core.checked(core.backend.write_raw(&full, bytes))?;
        core.commit(Some(key));
        Ok(())
    }

    /// Delete `key`. Returns whether it existed; removing a missing key is
    /// not a change and wakes no one.
    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let full = self.core.full_key(key);
        let existed = self.core.checked(self.core.backend.delete_raw(&full))?;
        if existed {
            self.core.commit(Some(key));
        }
        Ok(existed)
    }

    /// Delete every key of this namespace, and nothing outside it. Returns
    /// how many entries were deleted. Observers see a single change, or
    /// none when the namespace was already empty.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let core = &self.core;
        let raw = core.checked(core.backend.list_raw_keys(&core.prefix))?;

        let mut deleted = 0;
        let mut first_error = None;
        for full in &raw {
            match core.checked(core.backend.delete_raw(full)) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        if deleted > 0 {
            core.commit(None);
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(deleted),
        }
    }

    /// Apply change events other bridges published since the last call.
    /// Returns how many were applied; they reach observers as one change.
    pub fn poll_sync(&self) -> usize {
        let Some(link) = &self.core.sync else {
            return 0;
        };
        // Held by `run_sync`
        let Ok(mut receiver) = link.receiver.try_lock() else {
            return 0;
        };

        let mut applied = 0;
        loop {
            match receiver.try_recv() {
                Ok(event) if self.core.accepts(&event) => applied += 1,
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(namespace = %self.namespace(), skipped, "sync events dropped, resyncing");
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        drop(receiver);

        if applied > 0 {
            self.core.refresh();
        }
        applied
    }

    /// Apply other bridges' change events as they arrive, until `shutdown`
    /// completes. Must run on the thread whose runtime owns the bridge's
    /// signals, e.g. on a current-thread tokio runtime.
    pub async fn run_sync<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let Some(link) = &self.core.sync else {
            return 0;
        };
        let mut receiver = link.receiver.lock().await;
        tokio::pin!(shutdown);

        let mut applied = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = receiver.recv() => match received {
                    Ok(event) => {
                        if self.core.accepts(&event) {
                            self.core.refresh();
                            applied += 1;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(namespace = %self.namespace(), skipped, "sync events dropped, resyncing");
                        self.core.refresh();
                        applied += 1;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        applied
    }

    fn expire_later(&self, key: &str) {
        let core = Arc::clone(&self.core);
        let key = key.to_owned();
        Runtime::defer(move || untrack(|| core.expire(&key)));
    }
}

impl std::fmt::Debug for StoreBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBridge")
            .field("namespace", &self.core.config.namespace)
            .field("origin", &self.core.origin)
            .field("version", &self.core.version.get_untracked())
            .field("synced", &self.core.sync.is_some())
            .finish()
    }
}

/// Assembles a [`StoreBridge`] with a non-default clock or a sync hub.
pub struct BridgeBuilder {
    backend: Arc<dyn StorageBackend>,
    config: BridgeConfig,
    clock: Arc<dyn Clock>,
    hub: Option<SyncHub>,
}

impl BridgeBuilder {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sync(mut self, hub: &SyncHub) -> Self {
        self.hub = Some(hub.clone());
        self
    }

    pub fn build(self) -> Result<StoreBridge, StorageError> {
        self.config.validate()?;
        let prefix = self.config.prefix();
        let keys = match self.backend.list_raw_keys(&prefix) {
            Ok(raw) => strip_prefix(&prefix, raw),
            Err(error) => {
                warn!(namespace = %self.config.namespace, %error, "initial key scan failed");
                BTreeSet::new()
            }
        };
        let sync = self.hub.map(|hub| SyncLink {
            receiver: tokio::sync::Mutex::new(hub.subscribe()),
            hub,
        });
        let core = BridgeCore {
            backend: self.backend,
            prefix,
            clock: self.clock,
            version: Signal::new(0),
            keys: Signal::new(keys),
            on_error: RwLock::new(None),
            origin: NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed),
            sync,
            config: self.config,
        };
        Ok(StoreBridge {
            core: Arc::new(core),
        })
    }
}
