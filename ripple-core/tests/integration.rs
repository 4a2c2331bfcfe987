//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, and effects work together correctly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ripple_core::graph::{NodeKind, NodeState};
use ripple_core::reactive::{
    batch, computed, effect, untrack, Effect, EffectScope, Memo, Runtime, Signal, State,
};
use ripple_core::{ReactiveError, RuntimeConfig};

/// The canonical batching scenario: two writes, one re-run.
#[test]
fn batch_coalesces_writes_into_one_run() {
    let c = Signal::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let c_clone = c.clone();
    let log_clone = log.clone();
    let e = effect(move || log_clone.lock().push(c_clone.get()));
    assert_eq!(*log.lock(), vec![1]);

    batch(|| {
        c.set(2);
        c.set(3);
    });
    assert_eq!(*log.lock(), vec![1, 3]);
    e.dispose();
}

/// Test that an effect reading several cells never sees a half-applied batch.
#[test]
fn batch_is_glitch_free() {
    // Invariant maintained by every writer: first + last == 10
    let first = Signal::new(4);
    let last = Signal::new(6);
    let sums = Arc::new(Mutex::new(Vec::new()));

    let (f, l, s) = (first.clone(), last.clone(), sums.clone());
    let e = effect(move || s.lock().push(f.get() + l.get()));

    batch(|| {
        first.set(1);
        batch(|| last.set(9));
        // Nested batch closing does not flush
        assert_eq!(sums.lock().len(), 1);
    });

    assert_eq!(*sums.lock(), vec![10, 10]);
    e.dispose();
}

/// Test that a diamond-shaped graph updates its sink once with consistent inputs.
#[test]
fn diamond_dependency_runs_sink_once() {
    let a = Signal::new(1);
    let a1 = a.clone();
    let double = Memo::new(move || a1.get() * 2);
    let a2 = a.clone();
    let plus_one = Memo::new(move || a2.get() + 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (d, p, s) = (double.clone(), plus_one.clone(), seen.clone());
    let e = effect(move || s.lock().push((d.get(), p.get())));

    a.set(5);
    assert_eq!(*seen.lock(), vec![(2, 2), (10, 6)]);
    e.dispose();
}

/// Test that memos can depend on other memos.
#[test]
fn memo_depends_on_memo() {
    let base = Signal::new(10);

    let base_clone = base.clone();
    let doubled = Memo::new(move || base_clone.get() * 2);

    let doubled_clone = doubled.clone();
    let quadrupled = Memo::new(move || doubled_clone.get() * 2);

    assert_eq!(quadrupled.get(), 40);

    base.set(5);
    assert_eq!(doubled.state(), NodeState::Dirty);
    assert_eq!(quadrupled.state(), NodeState::MaybeDirty);
    assert_eq!(quadrupled.get(), 20);
    assert_eq!(Runtime::dependencies(quadrupled.id()), vec![doubled.id()]);
}

/// Test that only the branch taken on the last run stays subscribed.
#[test]
fn conditional_dependencies_follow_the_branch_taken() {
    let use_a = Signal::new(true);
    let a = Signal::new("a0");
    let b = Signal::new("b0");
    let runs = Arc::new(AtomicI32::new(0));

    let (cond, a_clone, b_clone, runs_clone) = (use_a.clone(), a.clone(), b.clone(), runs.clone());
    let e = Effect::new(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        if cond.get() {
            a_clone.get();
        } else {
            b_clone.get();
        }
    });

    // b is not read yet
    b.set("b1");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    use_a.set(false);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(a.subscriber_count(), 0);

    // The untaken branch no longer triggers
    a.set("a1");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    b.set("b2");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(e.dependency_count(), 2);
    e.dispose();
}

/// Test that memos cache values correctly.
#[test]
fn memo_computes_once_per_change() {
    let input = Signal::new(1);
    let compute_count = Arc::new(AtomicI32::new(0));

    let (input_clone, count_clone) = (input.clone(), compute_count.clone());
    let memo = computed(move || {
        count_clone.fetch_add(1, Ordering::SeqCst);
        input_clone.get() + 1
    });

    // Nothing computes until read
    input.set(2);
    assert_eq!(compute_count.load(Ordering::SeqCst), 0);

    for _ in 0..5 {
        assert_eq!(memo.get(), 3);
    }
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    input.set(3);
    input.set(4);
    for _ in 0..5 {
        assert_eq!(memo.get(), 5);
    }
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);
}

/// Test that a memo recomputing to an equal value does not re-run its readers.
#[test]
fn equal_memo_value_stops_propagation() {
    let width = Signal::new(120u32);
    let width_clone = width.clone();
    let is_wide = Memo::new(move || width_clone.get() > 100);

    let runs = Arc::new(AtomicI32::new(0));
    let (wide, runs_clone) = (is_wide.clone(), runs.clone());
    let e = effect(move || {
        wide.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    width.set(130);
    width.set(140);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    width.set(80);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    e.dispose();
}

/// Test that effects run in the order they were first dirtied.
#[test]
fn effects_run_in_first_dirtied_order() {
    let a = Signal::new(0);
    let b = Signal::new(0);
    let order = Arc::new(Mutex::new(Vec::new()));

    let (a_clone, order_a) = (a.clone(), order.clone());
    let on_a = effect(move || {
        a_clone.get();
        order_a.lock().push("a");
    });
    let (b_clone, order_b) = (b.clone(), order.clone());
    let on_b = effect(move || {
        b_clone.get();
        order_b.lock().push("b");
    });
    order.lock().clear();

    batch(|| {
        b.set(1);
        a.set(1);
        b.set(2);
    });
    assert_eq!(*order.lock(), vec!["b", "a"]);
    on_a.dispose();
    on_b.dispose();
}

/// Test that a chain of effects feeding each other drains in one flush.
#[test]
fn effect_chain_drains_to_fixed_point() {
    let signals: Vec<Signal<i32>> = (0..50).map(|_| Signal::new(0)).collect();
    let scope = EffectScope::new();
    for pair in signals.windows(2) {
        let (from, to) = (pair[0].clone(), pair[1].clone());
        scope.effect(move || to.set(from.get()));
    }

    signals[0].set(7);
    assert_eq!(signals[49].get(), 7);
    assert_eq!(Runtime::pending_effects(), 0);
    assert!(!Runtime::is_flushing());
}

/// Test that one failing effect does not stop the others in the same flush.
#[test]
fn panicking_effect_is_isolated_and_reported() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = errors.clone();
    Runtime::set_error_handler(move |err| errors_clone.lock().push(err.clone()));

    let trigger = Signal::new(0);
    let survivor_runs = Arc::new(AtomicI32::new(0));

    let t = trigger.clone();
    let failing = effect(move || {
        if t.get() > 0 {
            panic!("bad value");
        }
    });
    let (t, runs) = (trigger.clone(), survivor_runs.clone());
    let survivor = effect(move || {
        t.get();
        runs.fetch_add(1, Ordering::SeqCst);
    });

    trigger.set(1);
    assert_eq!(survivor_runs.load(Ordering::SeqCst), 2);
    {
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ReactiveError::EffectPanicked { node, message }
                if *node == failing.id() && message == "bad value"
        ));
    }

    // The failed effect kept its subscription and recovers
    trigger.set(0);
    assert_eq!(failing.run_count(), 2);

    Runtime::clear_error_handler();
    failing.dispose();
    survivor.dispose();
}

/// Test that a memo whose computation panics does not cut off its readers.
#[test]
fn panicking_memo_recovers_on_next_input() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = errors.clone();
    Runtime::set_error_handler(move |err| errors_clone.lock().push(err.clone()));

    let input = Signal::new(0);
    let i = input.clone();
    let checked = computed(move || {
        let value = i.get();
        if value == 1 {
            panic!("rejected input");
        }
        value
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (c, seen_clone) = (checked.clone(), seen.clone());
    let first = effect(move || seen_clone.lock().push(c.get()));
    let other_runs = Arc::new(AtomicI32::new(0));
    let (c, runs) = (checked.clone(), other_runs.clone());
    let second = effect(move || {
        c.get();
        runs.fetch_add(1, Ordering::SeqCst);
    });

    input.set(1);
    assert_eq!(*seen.lock(), vec![0]);
    assert_eq!(errors.lock().len(), 2);
    assert_eq!(checked.state(), NodeState::Clean);

    input.set(2);
    input.set(3);
    assert_eq!(*seen.lock(), vec![0, 2, 3]);
    assert_eq!(other_runs.load(Ordering::SeqCst), 3);
    assert_eq!(checked.get(), 3);

    Runtime::clear_error_handler();
    first.dispose();
    second.dispose();
}

/// Test that two effects re-triggering each other hit the flush ceiling.
#[test]
fn runaway_effects_hit_flush_limit() {
    Runtime::configure(RuntimeConfig {
        max_flush_iterations: 100,
    });

    let x = Signal::new(0);
    let y = Signal::new(0);
    let armed = Arc::new(AtomicBool::new(false));

    let (x1, y1) = (x.clone(), y.clone());
    let ping = effect(move || y1.set(x1.get() + 1));
    let (x2, y2, armed2) = (x.clone(), y.clone(), armed.clone());
    let pong = effect(move || {
        let value = y2.get();
        if armed2.load(Ordering::SeqCst) {
            x2.set(value + 1);
        }
    });

    armed.store(true, Ordering::SeqCst);
    let result = panic::catch_unwind(AssertUnwindSafe(|| x.set(100)));
    let payload = result.unwrap_err();
    assert_eq!(
        payload.downcast_ref::<ReactiveError>(),
        Some(&ReactiveError::FlushLimitExceeded { limit: 100 })
    );

    // The runtime is usable again afterwards
    assert!(!Runtime::is_flushing());
    assert_eq!(Runtime::pending_effects(), 0);
    armed.store(false, Ordering::SeqCst);
    ping.dispose();
    pong.dispose();
    x.set(1);
    assert_eq!(x.get(), 1);

    Runtime::configure(RuntimeConfig::default());
}

/// Test that cleanups run before each re-run and on disposal, never twice.
#[test]
fn cleanup_and_dispose_lifecycle() {
    let source = Signal::new(0);
    let live = Arc::new(AtomicI32::new(0));

    let (s, live_clone) = (source.clone(), live.clone());
    let e = Effect::with_cleanup(move || {
        s.get();
        live_clone.fetch_add(1, Ordering::SeqCst);
        let live = live_clone.clone();
        move || {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    });

    for value in 1..=3 {
        source.set(value);
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    e.dispose();
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(source.subscriber_count(), 0);

    source.set(10);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(e.run_count(), 4);
}

/// Test that untracked reads never subscribe.
#[test]
fn untrack_reads_without_subscribing() {
    let tracked = Signal::new(1);
    let hidden = Signal::new(1);
    let runs = Arc::new(AtomicI32::new(0));

    let (t, h, runs_clone) = (tracked.clone(), hidden.clone(), runs.clone());
    let e = effect(move || {
        let _ = t.get() + untrack(|| h.get());
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    hidden.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    tracked.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    e.dispose();
}

/// Test that the runtime snapshot describes the live graph.
#[test]
fn snapshot_reports_labels_and_edges() {
    let count = Signal::new(1).with_label("count");
    let c = count.clone();
    let doubled = Memo::new(move || c.get() * 2).with_label("doubled");
    let d = doubled.clone();
    let e = effect(move || {
        d.get();
    })
    .with_label("render");

    let snapshot = Runtime::snapshot();
    let find = |label: &str| {
        snapshot
            .iter()
            .find(|info| info.label.as_deref() == Some(label))
            .cloned()
            .unwrap()
    };

    let memo = find("doubled");
    assert_eq!(memo.kind, NodeKind::Derived);
    assert_eq!(memo.state, NodeState::Clean);
    assert_eq!(memo.dependencies, vec![count.id()]);
    assert_eq!(memo.dependents, vec![e.id()]);
    assert_eq!(find("count").dependents, vec![doubled.id()]);
    assert_eq!(find("render").kind, NodeKind::Effect);

    e.dispose();
    assert!(Runtime::snapshot()
        .iter()
        .all(|info| info.label.as_deref() != Some("render")));
}

/// Test that a reactive object behaves like a group of signals.
#[test]
fn state_object_drives_effects() {
    let form = Arc::new(State::new());
    form.set("name", String::from("ada")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (f, s) = (form.clone(), seen.clone());
    let e = effect(move || {
        let name: Option<String> = f.get("name").unwrap();
        s.lock().push((name, f.keys().len()));
    });

    batch(|| {
        form.set("name", String::from("grace")).unwrap();
        form.set("email", String::from("g@example.com")).unwrap();
    });
    assert_eq!(
        *seen.lock(),
        vec![(Some("ada".to_string()), 1), (Some("grace".to_string()), 2)]
    );
    e.dispose();
}
