//! Raw key/value resources a bridge can sit on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::StorageError;

/// A native, non-reactive key/value store.
///
/// Keys are full keys, namespace prefix included. Implementations decide
/// what "unavailable" or "full" means; the bridge only reports it.
pub trait StorageBackend: Send + Sync {
    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Returns whether the key existed. Deleting a missing key is not an
    /// error.
    fn delete_raw(&self, key: &str) -> Result<bool, StorageError>;

    /// Every key starting with `prefix`.
    fn list_raw_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).read_raw(key)
    }

    fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        (**self).write_raw(key, value)
    }

    fn delete_raw(&self, key: &str) -> Result<bool, StorageError> {
        (**self).delete_raw(key)
    }

    fn list_raw_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list_raw_keys(prefix)
    }
}

/// In-process storage.
///
/// Clones share the same entries, so several bridges over clones of one
/// backend behave like several tabs over one origin's storage. A byte quota
/// and an availability switch make failure paths reachable.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entries: DashMap<String, Vec<u8>>,
    /// Limit on the summed size of keys and values.
    quota: Option<usize>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                quota: Some(bytes),
                ..MemoryInner::default()
            }),
        }
    }

    /// Make every operation fail with [`StorageError::Unavailable`], the
    /// way storage behaves when blocked.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Bytes used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory backend disabled".into()));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_available()?;
        Ok(self.inner.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.check_available()?;
        if let Some(limit) = self.inner.quota {
            let replaced = self
                .inner
                .entries
                .get(key)
                .map(|entry| key.len() + entry.value().len())
                .unwrap_or(0);
            let needed = self.used_bytes() - replaced + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_owned(),
                    needed,
                    limit,
                });
            }
        }
        self.inner.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete_raw(&self, key: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.inner.entries.remove(key).is_some())
    }

    fn list_raw_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        let mut keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.len())
            .field("quota", &self.inner.quota)
            .field("unavailable", &self.inner.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        backend.write_raw("a:1", b"x".to_vec()).unwrap();
        assert_eq!(other.read_raw("a:1").unwrap(), Some(b"x".to_vec()));
        assert!(other.delete_raw("a:1").unwrap());
        assert!(!other.delete_raw("a:1").unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn list_is_prefix_scoped_and_sorted() {
        let backend = MemoryBackend::new();
        for key in ["a:2", "b:1", "a:1", "ab:1"] {
            backend.write_raw(key, Vec::new()).unwrap();
        }
        assert_eq!(backend.list_raw_keys("a:").unwrap(), vec!["a:1", "a:2"]);
    }

    #[test]
    fn quota_counts_replaced_entry_once() {
        let backend = MemoryBackend::with_quota(10);
        backend.write_raw("k", vec![0; 8]).unwrap();
        // Overwriting frees the old value first
        backend.write_raw("k", vec![0; 9]).unwrap();
        let err = backend.write_raw("j", vec![0; 1]).unwrap_err();
        assert_eq!(
            err,
            StorageError::QuotaExceeded {
                key: "j".into(),
                needed: 12,
                limit: 10
            }
        );
        assert_eq!(backend.used_bytes(), 10);
    }

    #[test]
    fn unavailable_backend_fails_every_call() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        assert!(matches!(backend.read_raw("k"), Err(StorageError::Unavailable(_))));
        assert!(matches!(backend.list_raw_keys(""), Err(StorageError::Unavailable(_))));
        backend.set_unavailable(false);
        assert_eq!(backend.read_raw("k").unwrap(), None);
    }
}
