//! Reactive objects.
//!
//! [`State`] is a keyed bag of signals. Every field is its own [`Signal`],
//! so reading one field never subscribes to another. Adding or removing a
//! field changes the object's shape, which is tracked separately: `keys()`,
//! `has()` and reads of missing fields re-run when a field appears.

use std::any::Any;
use std::fmt::Debug;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::batch::batch;
use super::runtime::Runtime;
use super::signal::Signal;
use crate::error::ReactiveError;
use crate::graph::NodeId;

/// A type-erased `Signal<T>` plus its node, so removal can notify readers
/// without knowing `T`.
struct Field {
    id: NodeId,
    signal: Box<dyn Any + Send + Sync>,
}

impl Field {
    fn new<T>(value: T) -> Self
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        let signal = Signal::new(value);
        Self {
            id: signal.id(),
            signal: Box::new(signal),
        }
    }

    fn typed<T>(&self, key: &str) -> Result<Signal<T>, ReactiveError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.signal
            .downcast_ref::<Signal<T>>()
            .cloned()
            .ok_or_else(|| ReactiveError::TypeMismatch {
                key: key.to_owned(),
            })
    }
}

/// A reactive object with typed per-field access.
///
/// ```rust,ignore
/// let user = State::new();
/// user.set("name", "ada".to_string())?;
/// user.set("age", 36u32)?;
///
/// let name: Option<String> = user.get("name")?;
/// assert!(user.get::<u32>("name").is_err()); // wrong type
/// ```
pub struct State {
    fields: RwLock<IndexMap<String, Field>>,
    shape: Signal<u64>,
}

impl State {
    pub fn new() -> Self {
        Self {
            fields: RwLock::new(IndexMap::new()),
            shape: Signal::new(0),
        }
    }

    /// Read a field. Tracked on the field, or on the shape if the field is
    /// missing.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>, ReactiveError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        Ok(self.field::<T>(key)?.map(|signal| signal.get()))
    }

    /// Write a field, creating it if needed. Writing a value of another
    /// type than the field holds fails and changes nothing.
    pub fn set<T>(&self, key: &str, value: T) -> Result<(), ReactiveError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        let existing = {
            let mut fields = self.fields.write();
            match fields.get(key) {
                Some(field) => Some(field.typed::<T>(key)?),
                None => {
                    fields.insert(key.to_owned(), Field::new(value.clone()));
                    None
                }
            }
        };

        // Locks are released before anything can run
        match existing {
            Some(signal) => signal.set(value),
            None => self.shape.update(|n| n + 1),
        }
        Ok(())
    }

    /// The signal backing a field, for sharing it directly.
    pub fn field<T>(&self, key: &str) -> Result<Option<Signal<T>>, ReactiveError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        let found = {
            let fields = self.fields.read();
            fields.get(key).map(|field| field.typed::<T>(key)).transpose()?
        };
        if found.is_none() {
            self.shape.get();
        }
        Ok(found)
    }

    /// Whether the field exists. Tracked on the shape.
    pub fn has(&self, key: &str) -> bool {
        self.shape.get();
        self.fields.read().contains_key(key)
    }

    /// Field names in insertion order. Tracked on the shape.
    pub fn keys(&self) -> Vec<String> {
        self.shape.get();
        self.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shape.get();
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete a field. Readers of the field and of the shape re-run once.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.fields.write().shift_remove(key);
        let Some(field) = removed else {
            return false;
        };
        batch(|| {
            Runtime::notify_changed(field.id);
            self.shape.update(|n| n + 1);
        });
        true
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("keys", &self.fields.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
