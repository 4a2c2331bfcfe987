//! Persisted value encoding.
//!
//! Every stored value is wrapped in an [`Envelope`] recording when it was
//! written and when it expires, then encoded with the bridge's [`Codec`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A stored value with its write time and optional expiry, both in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<V> {
    pub value: V,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}

impl<V> Envelope<V> {
    pub fn new(value: V, now: u64, ttl_ms: Option<u64>) -> Self {
        Self {
            value,
            timestamp: now,
            expires: ttl_ms.map(|ttl| now.saturating_add(ttl)),
        }
    }

    /// An entry is gone once its expiry instant has been reached.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| now >= expires)
    }
}

/// Wire format for envelopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// `{"value":…,"timestamp":…,"expires":…}` via serde_json.
    #[default]
    Json,
    /// The same map encoded as MessagePack via rmp-serde.
    MessagePack,
}

impl Codec {
    pub fn encode<V: Serialize>(&self, key: &str, envelope: &Envelope<V>) -> Result<Vec<u8>, StorageError> {
        let encoded = match self {
            Codec::Json => serde_json::to_vec(envelope).map_err(|e| e.to_string()),
            Codec::MessagePack => rmp_serde::to_vec_named(envelope).map_err(|e| e.to_string()),
        };
        encoded.map_err(|message| StorageError::Encode {
            key: key.to_owned(),
            message,
        })
    }

    pub fn decode<V: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<Envelope<V>, StorageError> {
        let decoded = match self {
            Codec::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            Codec::MessagePack => rmp_serde::from_slice(bytes).map_err(|e| e.to_string()),
        };
        decoded.map_err(|message| StorageError::Decode {
            key: key.to_owned(),
            message,
        })
    }
}
