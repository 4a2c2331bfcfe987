//! Effect Scope
//!
//! Groups effects so they can be disposed together: create a scope when a
//! piece of state comes to life, drop it when it goes away, and every effect
//! it owns is torn down with it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::effect::Effect;
use super::observer::Cleanup;

/// An owner for a group of effects.
///
/// ```rust,ignore
/// let scope = EffectScope::new();
/// scope.effect(move || println!("{}", name.get()));
/// drop(scope); // the effect is disposed
/// ```
pub struct EffectScope {
    active: AtomicBool,
    effects: Mutex<Vec<Effect>>,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl EffectScope {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            effects: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    /// Create an effect owned by this scope.
    ///
    /// On a stopped scope the effect is disposed right after its first run.
    pub fn effect<F>(&self, run: F) -> Effect
    where
        F: FnMut() + Send + 'static,
    {
        self.adopt(Effect::new(run))
    }

    /// Create an effect with per-run cleanup owned by this scope.
    pub fn effect_with_cleanup<F, C>(&self, run: F) -> Effect
    where
        F: FnMut() -> C + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.adopt(Effect::with_cleanup(run))
    }

    /// Take ownership of an existing effect.
    pub fn adopt(&self, effect: Effect) -> Effect {
        if self.is_active() {
            self.effects.lock().push(effect.clone());
        } else {
            effect.dispose();
        }
        effect
    }

    /// Register a callback that runs when the scope stops.
    pub fn on_stop(&self, cleanup: impl FnOnce() + Send + 'static) {
        if self.is_active() {
            self.cleanups.lock().push(Box::new(cleanup));
        } else {
            cleanup();
        }
    }

    /// Dispose every owned effect, then run the stop callbacks in
    /// registration order. Stopping twice is a no-op.
    pub fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let effects = std::mem::take(&mut *self.effects.lock());
        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        tracing::trace!(effects = effects.len(), "effect scope stopped");

        for effect in effects {
            effect.dispose();
        }
        for cleanup in cleanups {
            cleanup();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of live effects owned by the scope.
    pub fn len(&self) -> usize {
        self.effects
            .lock()
            .iter()
            .filter(|effect| !effect.is_disposed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EffectScope {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("effects", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    #[test]
    fn dropping_scope_disposes_effects() {
        let count = Signal::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let effect = {
            let scope = EffectScope::new();
            let count_clone = count.clone();
            let runs_clone = runs.clone();
            let effect = scope.effect(move || {
                count_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            });
            count.set(1);
            assert_eq!(scope.len(), 1);
            effect
        };

        assert!(effect.is_disposed());
        count.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_runs_callbacks_once() {
        let stops = Arc::new(AtomicI32::new(0));
        let scope = EffectScope::new();

        let stops_clone = stops.clone();
        scope.on_stop(move || {
            stops_clone.fetch_add(1, Ordering::SeqCst);
        });
        scope.stop();
        scope.stop();
        assert!(!scope.is_active());
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        // Late registrations run immediately
        let stops_clone = stops.clone();
        scope.on_stop(move || {
            stops_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn adopt_into_stopped_scope_disposes() {
        let scope = EffectScope::new();
        scope.stop();
        let effect = scope.effect(|| {});
        assert!(effect.is_disposed());
        assert!(scope.is_empty());
    }
}
