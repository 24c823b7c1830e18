//! Integration tests for dependency tracking.
//!
//! These tests verify that proxies, memos and effects agree on who depends
//! on what, and that writes re-run exactly the right computations.

use std::cell::Cell;
use std::rc::Rc;

use trellis_core::reactive::{Effect, EffectOptions, Memo, Reactive, Signal, Value};
use trellis_core::{configure, RuntimeConfig};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

#[test]
fn write_triggers_each_subscriber_once() {
    let state = Reactive::new_object([("count", Value::from(0))]);
    let runs = counter();

    let _effect = Effect::new({
        let state = state.clone();
        let runs = runs.clone();
        move || {
            state.get("count");
            state.get("count");
            runs.set(runs.get() + 1);
        }
    });
    assert_eq!(runs.get(), 1);

    state.set("count", 1);
    assert_eq!(runs.get(), 2);

    // Same value, including NaN against NaN.
    state.set("count", 1);
    assert_eq!(runs.get(), 2);
    state.set("count", f64::NAN);
    assert_eq!(runs.get(), 3);
    state.set("count", f64::NAN);
    assert_eq!(runs.get(), 3);
}

#[test]
fn stale_branch_is_pruned() {
    let state = Reactive::new_object([
        ("flag", Value::from(true)),
        ("a", Value::from("a")),
        ("b", Value::from("b")),
    ]);
    let runs = counter();

    let effect = Effect::new({
        let state = state.clone();
        let runs = runs.clone();
        move || {
            runs.set(runs.get() + 1);
            if state.get("flag") == Value::from(true) {
                state.get("a");
            } else {
                state.get("b");
            }
        }
    });
    assert_eq!(effect.dependency_count(), 2);

    state.set("flag", false);
    assert_eq!(runs.get(), 2);

    // `a` is no longer read.
    state.set("a", "a2");
    assert_eq!(runs.get(), 2);
    state.set("b", "b2");
    assert_eq!(runs.get(), 3);
    assert_eq!(effect.dependency_count(), 2);
}

#[test]
fn effect_does_not_retrigger_itself() {
    let state = Reactive::new_object([("n", Value::from(0))]);
    let runs = counter();

    let _effect = Effect::new({
        let state = state.clone();
        let runs = runs.clone();
        move || {
            runs.set(runs.get() + 1);
            let n = state.get("n").as_f64().unwrap_or(0.0);
            state.set("n", n + 1.0);
        }
    });
    assert_eq!(runs.get(), 1);
    assert_eq!(state.get("n"), Value::from(1));

    state.set("n", 5);
    assert_eq!(runs.get(), 2);
    assert_eq!(state.get("n"), Value::from(6));
}

#[test]
fn memo_is_lazy_and_cached() {
    let count = Signal::new(1);
    let evaluations = counter();

    let doubled = Memo::new({
        let count = count.clone();
        let evaluations = evaluations.clone();
        move || {
            evaluations.set(evaluations.get() + 1);
            count.get() * 2
        }
    });
    assert_eq!(evaluations.get(), 0);

    assert_eq!(doubled.get(), 2);
    assert_eq!(doubled.get(), 2);
    assert_eq!(evaluations.get(), 1);

    count.set(2);
    assert_eq!(evaluations.get(), 1);
    assert_eq!(doubled.get(), 4);
    assert_eq!(doubled.get(), 4);
    assert_eq!(evaluations.get(), 2);
}

#[test]
fn map_iteration_tracks_keys_and_entries_separately() {
    let map = Reactive::new_map([(Value::from("a"), Value::from(1))]);
    let key_runs = counter();
    let entry_runs = counter();

    let _keys = Effect::new({
        let map = map.clone();
        let key_runs = key_runs.clone();
        move || {
            map.keys();
            key_runs.set(key_runs.get() + 1);
        }
    });
    let _entries = Effect::new({
        let map = map.clone();
        let entry_runs = entry_runs.clone();
        move || {
            map.entries();
            entry_runs.set(entry_runs.get() + 1);
        }
    });

    // Overwrite: entries change, the key set does not.
    map.set("a", 2);
    assert_eq!((key_runs.get(), entry_runs.get()), (1, 2));

    map.set("a", 2);
    assert_eq!((key_runs.get(), entry_runs.get()), (1, 2));

    map.set("b", 1);
    assert_eq!((key_runs.get(), entry_runs.get()), (2, 3));

    assert!(map.delete("a"));
    assert_eq!((key_runs.get(), entry_runs.get()), (3, 4));
}

#[test]
fn array_length_writes_reach_index_readers_past_it() {
    let list = Reactive::new_array([Value::from(1), Value::from(2), Value::from(3)]);
    let seen = Rc::new(Cell::new(Value::Null));

    let _effect = Effect::new({
        let list = list.clone();
        let seen = seen.clone();
        move || seen.set(list.get(2))
    });
    assert_eq!(seen.take(), Value::from(3));

    list.set_len(1);
    assert_eq!(seen.take(), Value::Null);
}

#[test]
fn nested_objects_are_reactive() {
    let inner = Reactive::new_object([("x", Value::from(1))]);
    let outer = Reactive::new_object([("inner", Value::from(inner.clone()))]);
    let runs = counter();

    let _effect = Effect::new({
        let outer = outer.clone();
        let runs = runs.clone();
        move || {
            outer.get("inner").get("x");
            runs.set(runs.get() + 1);
        }
    });

    inner.set("x", 2);
    assert_eq!(runs.get(), 2);
}

#[test]
fn deep_nesting_falls_back_to_full_cleanup() {
    configure(RuntimeConfig {
        max_marker_bits: 1,
        ..RuntimeConfig::default()
    })
    .unwrap();

    let state = Reactive::new_object([
        ("round", Value::from(0)),
        ("flag", Value::from(true)),
        ("a", Value::from(0)),
        ("b", Value::from(0)),
    ]);
    let notified = counter();

    let inner = Effect::with_options(
        {
            let state = state.clone();
            move || {
                if state.get("flag") == Value::from(true) {
                    state.get("a");
                } else {
                    state.get("b");
                }
            }
        },
        EffectOptions {
            lazy: true,
            scheduler: Some(Rc::new({
                let notified = notified.clone();
                move || notified.set(notified.get() + 1)
            })),
            ..EffectOptions::default()
        },
    );

    // The inner effect only ever runs at depth two, past the single bit.
    let _outer = Effect::new({
        let state = state.clone();
        let inner = inner.clone();
        move || {
            state.get("round");
            inner.run();
        }
    });
    assert_eq!(inner.dependency_count(), 2);

    state.set("flag", false);
    assert_eq!(notified.get(), 1);
    state.set("round", 1);
    assert_eq!(inner.run_count(), 2);

    state.set("a", 1);
    assert_eq!(notified.get(), 1);
    state.set("b", 1);
    assert_eq!(notified.get(), 2);
    assert_eq!(inner.dependency_count(), 2);

    configure(RuntimeConfig::default()).unwrap();
}

#[test]
fn stopped_effect_ignores_writes() {
    let count = Signal::new(0);
    let runs = counter();

    let effect = Effect::new({
        let count = count.clone();
        let runs = runs.clone();
        move || {
            count.get();
            runs.set(runs.get() + 1);
        }
    });
    effect.stop();
    effect.stop();

    count.set(1);
    assert_eq!(runs.get(), 1);
    assert_eq!(count.subscriber_count(), 0);
}
