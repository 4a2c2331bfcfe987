//! Error types.
//!
//! Two families: [`ReactiveError`] for misuse of the dependency engine and
//! for effect failures, and [`StorageError`] for failures of the external
//! resource behind a storage bridge.
//!
//! Programming-invariant violations (runaway flushes, cycles, writes inside
//! a memo, re-entrant runs) are raised as panics whose payload is the
//! [`ReactiveError`] itself, so callers that catch unwinds can downcast it.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised by the reactive engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("effect flush exceeded {limit} iterations; an effect keeps re-triggering itself")]
    FlushLimitExceeded { limit: usize },

    #[error("cycle detected: memo {node} was read while it was computing")]
    CycleDetected { node: NodeId },

    #[error("signal {signal} was written while memo {memo} was computing")]
    WriteInComputed { signal: NodeId, memo: NodeId },

    #[error("effect {node} was re-entered while it was running")]
    ReentrantRun { node: NodeId },

    #[error("effect {node} was used after it was disposed")]
    Disposed { node: NodeId },

    #[error("effect {node} panicked: {message}")]
    EffectPanicked { node: NodeId, message: String },

    #[error("field `{key}` holds a value of a different type")]
    TypeMismatch { key: String },

    #[error("no operation has been executed yet, nothing to refetch")]
    NothingToRefetch,
}

impl ReactiveError {
    /// Whether this error signals a broken invariant that must unwind to
    /// the caller rather than be reported and swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FlushLimitExceeded { .. }
                | Self::CycleDetected { .. }
                | Self::WriteInComputed { .. }
                | Self::ReentrantRun { .. }
                | Self::Disposed { .. }
        )
    }
}

/// Errors raised by a storage backend or by value encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage is unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded writing `{key}`: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("failed to encode `{key}`: {message}")]
    Encode { key: String, message: String },

    #[error("failed to decode `{key}`: {message}")]
    Decode { key: String, message: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("invalid namespace `{namespace}`: {reason}")]
    InvalidNamespace {
        namespace: String,
        reason: &'static str,
    },
}

/// Any error produced by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unwind with a fatal engine error as the panic payload.
pub(crate) fn raise(error: ReactiveError) -> ! {
    tracing::error!(%error, "reactive invariant violated");
    std::panic::panic_any(error)
}

/// Render a panic payload for reporting.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(error) = payload.downcast_ref::<ReactiveError>() {
        error.to_string()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_invariant_violations() {
        let node = NodeId::from(3);
        assert!(ReactiveError::CycleDetected { node }.is_fatal());
        assert!(ReactiveError::FlushLimitExceeded { limit: 10 }.is_fatal());
        assert!(!ReactiveError::EffectPanicked {
            node,
            message: "boom".into()
        }
        .is_fatal());
        assert!(!ReactiveError::NothingToRefetch.is_fatal());
    }

    #[test]
    fn messages_name_the_node() {
        let err = ReactiveError::WriteInComputed {
            signal: NodeId::from(1),
            memo: NodeId::from(2),
        };
        assert_eq!(
            err.to_string(),
            "signal #1 was written while memo #2 was computing"
        );
    }

    #[test]
    fn crate_error_wraps_both_families() {
        let err: Error = StorageError::Unavailable("private mode".into()).into();
        assert_eq!(err.to_string(), "storage is unavailable: private mode");
        let err: Error = ReactiveError::NothingToRefetch.into();
        assert!(matches!(err, Error::Reactive(_)));
    }

    #[test]
    fn panic_payloads_render() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("plain");
        assert_eq!(panic_message(payload.as_ref()), "plain");
        let payload: Box<dyn std::any::Any + Send> =
            Box::new(ReactiveError::NothingToRefetch);
        assert!(panic_message(payload.as_ref()).starts_with("no operation"));
    }
}
