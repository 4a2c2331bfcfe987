//! Batching
//!
//! A batch groups several writes into one flush. Effects dirtied inside it
//! are queued, and run once the outermost batch closes, so they observe
//! either the state before the batch or the state after it, never a mix.

use super::runtime::Runtime;

/// Run `f` with effect flushing deferred until the outermost batch returns.
///
/// ```rust,ignore
/// let c = signal(1);
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let sink = log.clone();
/// let c2 = c.clone();
/// let _e = effect(move || sink.lock().push(c2.get()));
///
/// batch(|| {
///     c.set(2);
///     c.set(3);
/// });
/// assert_eq!(*log.lock(), vec![1, 3]);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    Runtime::enter_batch();

    // Exits the batch even if `f` unwinds
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = Runtime::exit_batch();
            // No flushing while unwinding: a second panic would abort
            if depth == 0 && !std::thread::panicking() {
                Runtime::schedule_flush();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    Runtime::is_batching()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_returns_value_and_restores_depth() {
        assert!(!is_batching());
        let value = batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
            42
        });
        assert_eq!(value, 42);
        assert!(!is_batching());
    }

    #[test]
    fn batch_depth_recovers_after_panic() {
        let result = std::panic::catch_unwind(|| batch(|| panic!("inside batch")));
        assert!(result.is_err());
        assert!(!is_batching());
    }
}
