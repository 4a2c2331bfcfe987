//! Configuration.
//!
//! Both configs deserialize from JSON with every field optional, so a
//! partial document only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::Codec;

/// Tuning knobs for one thread's reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Effect runs allowed in a single flush before the runtime decides an
    /// effect is re-triggering itself and aborts.
    pub max_flush_iterations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 10_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Settings for one storage bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Prefix owning every key the bridge touches.
    pub namespace: String,

    /// Placed between namespace and key. Keeps namespace `a` from
    /// matching keys of namespace `ab`.
    pub separator: String,

    /// TTL applied by `set` when no explicit TTL is given.
    pub default_ttl_ms: Option<u64>,

    /// Encoding of persisted envelopes.
    pub codec: Codec,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: "app".to_owned(),
            separator: ":".to_owned(),
            default_ttl_ms: None,
            codec: Codec::Json,
        }
    }
}

impl BridgeConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check that this namespace's prefix cannot cover another namespace's
    /// keys. With a non-empty separator that the namespace does not contain,
    /// no prefix `ns + sep` starts another one. Bridges sharing a backend
    /// must use the same separator.
    pub fn validate(&self) -> Result<(), StorageError> {
        let reason = if self.namespace.is_empty() {
            "namespace is empty"
        } else if self.separator.is_empty() {
            "separator is empty"
        } else if self.namespace.contains(self.separator.as_str()) {
            "namespace contains the separator"
        } else {
            return Ok(());
        };
        Err(StorageError::InvalidNamespace {
            namespace: self.namespace.clone(),
            reason,
        })
    }

    /// The raw key prefix, e.g. `"app:"`.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.namespace, self.separator)
    }
}
