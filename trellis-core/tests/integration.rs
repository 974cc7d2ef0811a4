//! Integration Tests for the Reactive State Engine
//!
//! These tests drive views, computations and the scheduler together through
//! the public API, the way a host application would.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::{
    ComputationError, EffectHandle, Object, PropKey, ReactiveObject, Recording, RunPhase, Runtime, RuntimeConfig,
    StateError, Value,
};

fn log<T>() -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Vec<T>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    (log.clone(), log)
}

fn int(view: &ReactiveObject, key: &str) -> Option<i64> {
    view.get(key).and_then(|p| p.as_i64())
}

fn at(view: &ReactiveObject, index: usize) -> Option<i64> {
    view.get(index).and_then(|p| p.as_i64())
}

fn contents(view: &ReactiveObject) -> Vec<Value> {
    view.to_vec().into_iter().map(Value::from).collect()
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}

/// Reading `user.name` must not react to `user.age` or to unrelated fields.
#[test]
fn nested_reads_track_only_the_leaf_read() {
    let rt = Runtime::default();
    let user = Object::from_fields([("name", Value::from("ada")), ("age", Value::from(36))]);
    let state = rt
        .create_reactive_state(Object::from_fields([("user", Value::from(user)), ("other", Value::from(0))]))
        .unwrap();

    let (seen, out) = log();
    let s = state.clone();
    let effect = rt.run_effect(move || {
        let name = s.get_path("user.name").and_then(|p| p.as_str().map(str::to_owned));
        out.lock().push(name);
    });

    state.get("user").unwrap().as_object().unwrap().set("age", 37).unwrap();
    state.set("other", 1).unwrap();
    assert_eq!(rt.pending_count(), 0);
    assert_eq!(rt.run_until_idle().unwrap(), 0);

    state.get("user").unwrap().as_object().unwrap().set("name", "grace").unwrap();
    assert_eq!(rt.run_until_idle().unwrap(), 1);

    assert_eq!(effect.run_count(), 2);
    assert_eq!(*seen.lock(), vec![Some("ada".to_string()), Some("grace".to_string())]);
}

/// The same raw object always comes back as the same view.
#[test]
fn views_are_identity_stable() {
    let rt = Runtime::default();
    let inner = Object::from_fields([("x", 1)]);
    let state = rt
        .create_reactive_state(Object::from_fields([("a", Value::from(inner.clone())), ("b", Value::from(inner.clone()))]))
        .unwrap();

    let a = state.get("a").unwrap().into_object().unwrap();
    let b = state.get("b").unwrap().into_object().unwrap();
    assert!(a.ptr_eq(&b));
    assert!(a.ptr_eq(&state.get("a").unwrap().into_object().unwrap()));
    assert!(a.ptr_eq(&rt.create_reactive_state(inner).unwrap()));
    assert!(state.ptr_eq(&rt.create_reactive_state(state.clone()).unwrap()));
}

/// Several writes in one burst produce one re-run per affected computation.
#[test]
fn writes_in_a_burst_run_each_computation_once() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("a", 1), ("b", 2)])).unwrap();

    let (seen, out) = log();
    let s = state.clone();
    let effect = rt.run_effect(move || {
        out.lock().push(int(&s, "a").unwrap_or(0) + int(&s, "b").unwrap_or(0));
    });

    state.set("a", 10).unwrap();
    state.set("b", 20).unwrap();
    state.set("a", 100).unwrap();

    assert_eq!(rt.pending_count(), 1);
    assert_eq!(rt.run_until_idle().unwrap(), 1);
    assert_eq!(effect.run_count(), 2);
    assert_eq!(*seen.lock(), vec![3, 120]);
}

/// Reading past the end and then pushing into that slot re-runs exactly once.
#[test]
fn push_notifies_readers_of_the_new_slot_and_length() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    let effect = rt.run_effect(move || {
        let third = l.get(2usize).and_then(|p| p.as_i64());
        out.lock().push((third, l.len()));
    });

    assert_eq!(list.push(3).unwrap(), 3);
    assert_eq!(rt.run_until_idle().unwrap(), 1);

    assert_eq!(effect.run_count(), 2);
    assert_eq!(*seen.lock(), vec![(None, 2), (Some(3), 3)]);
}

/// Removing the first item moves every item; a reader of index 0 sees the new head.
#[test]
fn shift_notifies_readers_of_moved_items() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3])).unwrap();
    let unrelated = rt.create_reactive_state(Object::from_fields([("x", 0)])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    let head = rt.run_effect(move || {
        out.lock().push(l.get(0usize).and_then(|p| p.as_i64()));
    });
    let u = unrelated.clone();
    let bystander = rt.run_effect(move || {
        let _ = u.get("x");
    });

    let removed = list.shift().unwrap().unwrap();
    assert_eq!(removed.as_i64(), Some(1));
    rt.run_until_idle().unwrap();

    assert_eq!(head.run_count(), 2);
    assert_eq!(bystander.run_count(), 1);
    assert_eq!(*seen.lock(), vec![Some(1), Some(2)]);
}

/// A balanced splice leaves the length untouched.
#[test]
fn balanced_splice_does_not_notify_length_readers() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3])).unwrap();

    let l = list.clone();
    let length_reader = rt.run_effect(move || {
        let _ = l.len();
    });
    let l = list.clone();
    let slot_reader = rt.run_effect(move || {
        let _ = l.get(1usize);
    });

    let removed = list.splice(1, 1, [20]).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].as_i64(), Some(2));
    rt.run_until_idle().unwrap();

    assert_eq!(length_reader.run_count(), 1);
    assert_eq!(slot_reader.run_count(), 2);
}

#[test]
fn reorders_notify_index_readers() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([3, 1, 2])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    rt.run_effect(move || {
        out.lock().push(l.get(0usize).and_then(|p| p.as_i64()));
    });

    list.sort().unwrap();
    rt.run_until_idle().unwrap();
    list.reverse().unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(*seen.lock(), vec![Some(3), Some(1), Some(3)]);
    assert_eq!(list.to_value().as_object().unwrap().item(2), Some(Value::Int(1)));
}

#[test]
fn methods_can_be_invoked_by_name() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3])).unwrap();

    let l = list.clone();
    let effect = rt.run_effect(move || {
        let _ = l.len();
    });

    assert_eq!(list.invoke("push", &[Value::from(4)]).unwrap().as_i64(), Some(4));
    assert_eq!(list.invoke("pop", &[]).unwrap().as_i64(), Some(4));
    assert_eq!(list.invoke("indexOf", &[Value::from(2)]).unwrap().as_i64(), Some(1));
    assert_eq!(list.invoke("indexOf", &[Value::from(9)]).unwrap().as_i64(), Some(-1));

    let tail = list.invoke("slice", &[Value::from(-2)]).unwrap().into_object().unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail.get(0usize).and_then(|p| p.as_i64()), Some(2));

    assert!(matches!(
        list.invoke("frobnicate", &[]),
        Err(StateError::UnknownMethod(name)) if name == "frobnicate"
    ));

    rt.run_until_idle().unwrap();
    // push and pop in one burst: one re-run.
    assert_eq!(effect.run_count(), 2);
}

#[test]
fn sequence_operations_reject_records() {
    let rt = Runtime::default();
    let record = rt.create_reactive_state(Object::record()).unwrap();
    assert!(matches!(record.push(1), Err(StateError::KindMismatch { .. })));
}

/// After disposal, nothing the computation read can re-run it.
#[test]
fn disposed_computations_never_run_again() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("a", 1)])).unwrap();

    let s = state.clone();
    let effect = rt.run_effect(move || {
        let _ = s.get("a");
    });
    assert_eq!(rt.graph_snapshot().edge_count(), 1);

    effect.dispose();
    effect.dispose();
    assert!(effect.is_disposed());
    assert_eq!(rt.graph_snapshot().edge_count(), 0);
    assert_eq!(rt.computation_count(), 0);

    state.set("a", 2).unwrap();
    assert!(!rt.is_flush_scheduled());
    assert_eq!(rt.run_until_idle().unwrap(), 0);
    assert_eq!(effect.run_count(), 1);
}

/// Disposing a pending computation from an earlier one in the same flush skips it.
#[test]
fn disposal_during_a_flush_skips_the_pending_run() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("x", 0)])).unwrap();

    let victim: Arc<Mutex<Option<EffectHandle>>> = Arc::new(Mutex::new(None));
    let (s, v) = (state.clone(), victim.clone());
    rt.run_effect(move || {
        if int(&s, "x") == Some(1) {
            if let Some(handle) = v.lock().as_ref() {
                handle.dispose();
            }
        }
    });
    let s = state.clone();
    let handle = rt.run_effect(move || {
        let _ = s.get("x");
    });
    *victim.lock() = Some(handle.clone());

    state.set("x", 1).unwrap();
    assert_eq!(rt.pending_count(), 2);
    rt.run_until_idle().unwrap();

    assert!(handle.is_disposed());
    assert_eq!(handle.run_count(), 1);
}

/// One failing computation does not stop the rest of the flush.
#[test]
fn failures_are_isolated_and_reported_once() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("x", 0)])).unwrap();

    let (errors, sink) = log::<String>();
    rt.set_error_handler(move |err: &ComputationError| sink.lock().push(err.to_string()));

    let s = state.clone();
    let failing = rt.run_effect(move || {
        if int(&s, "x") == Some(1) {
            panic!("x must not be one");
        }
    });
    let (seen, out) = log();
    let s = state.clone();
    rt.run_effect(move || {
        out.lock().push(int(&s, "x"));
    });

    state.set("x", 1).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(errors.lock().len(), 1);
    assert!(errors.lock()[0].contains("x must not be one"));
    assert_eq!(*seen.lock(), vec![Some(0), Some(1)]);

    // Still registered: the next change runs it again.
    state.set("x", 2).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(failing.run_count(), 3);
    assert_eq!(errors.lock().len(), 1);
}

#[test]
fn returned_errors_reach_the_channel() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("ok", true)])).unwrap();

    let (errors, sink) = log();
    rt.set_error_handler(move |err: &ComputationError| sink.lock().push((err.computation, err.is_panic())));

    let s = state.clone();
    let effect = rt.run_effect(move || -> Result<(), io::Error> {
        match s.get("ok").and_then(|p| p.as_bool()) {
            Some(true) => Ok(()),
            _ => Err(io::Error::new(io::ErrorKind::InvalidData, "not ok")),
        }
    });

    state.set("ok", false).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(*errors.lock(), vec![(effect.id(), false)]);
}

/// Writing the value already stored schedules nothing.
#[test]
fn writing_the_same_value_is_silent() {
    let rt = Runtime::default();
    let shared = Object::record();
    let state = rt
        .create_reactive_state(Object::from_fields([("n", Value::from(1)), ("o", Value::from(shared.clone()))]))
        .unwrap();

    let s = state.clone();
    let effect = rt.run_effect(move || {
        let _ = (s.get("n"), s.get("o"));
    });

    state.set("n", 1).unwrap();
    state.set("o", shared).unwrap();
    assert!(!rt.is_flush_scheduled());
    assert_eq!(rt.run_until_idle().unwrap(), 0);
    assert_eq!(effect.run_count(), 1);
}

/// A write made by a running computation is picked up by a later flush.
#[test]
fn writes_during_a_flush_schedule_a_new_flush() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("x", 0), ("y", 0)])).unwrap();

    let s = state.clone();
    rt.run_effect(move || {
        let x = int(&s, "x").unwrap_or(0);
        s.set("y", x * 2).unwrap();
    });
    let (seen, out) = log();
    let s = state.clone();
    rt.run_effect(move || {
        out.lock().push(int(&s, "y"));
    });

    state.set("x", 1).unwrap();
    assert_eq!(rt.run_until_idle().unwrap(), 2);
    assert_eq!(*seen.lock(), vec![Some(0), Some(2)]);
}

/// A computation created inside another tracks on its own.
#[test]
fn nested_computations_track_separately() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("a", 0), ("b", 0)])).unwrap();

    let inner_runs = Arc::new(AtomicUsize::new(0));
    let inner: Arc<Mutex<Option<EffectHandle>>> = Arc::new(Mutex::new(None));

    let (rt2, s, slot, runs) = (rt.clone(), state.clone(), inner.clone(), inner_runs.clone());
    let outer = rt.run_effect(move || {
        let mut slot = slot.lock();
        if slot.is_none() {
            let (s, runs) = (s.clone(), runs.clone());
            *slot = Some(rt2.run_effect(move || {
                let _ = s.get("b");
                runs.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(slot);
        let _ = s.get("a");
    });

    state.set("b", 1).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(outer.run_count(), 1);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

    state.set("a", 1).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(outer.run_count(), 2);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn frozen_objects_are_read_only() {
    let rt = Runtime::default();
    let raw = Object::from_values([1]);
    raw.freeze();
    let list = rt.create_reactive_state(raw).unwrap();

    assert!(matches!(list.push(2), Err(StateError::Frozen(_))));
    assert!(matches!(list.set(0usize, 5), Err(StateError::Frozen(_))));
    assert_eq!(list.len(), 1);
}

#[test]
fn json_documents_become_reactive_state() {
    let rt = Runtime::default();
    let doc = Value::from_json_str(r#"{ "todos": [ { "title": "write", "done": false } ] }"#).unwrap();
    let state = rt.create_reactive_state(doc).unwrap();

    let (seen, out) = log();
    let s = state.clone();
    rt.run_effect(move || {
        out.lock().push(s.get_path("todos.0.done").and_then(|p| p.as_bool()));
    });

    let todo = state.get_path("todos.0").unwrap().into_object().unwrap();
    todo.set("done", true).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(*seen.lock(), vec![Some(false), Some(true)]);
    let exported = state.to_value().to_json().unwrap();
    assert_eq!(exported["todos"][0]["done"], serde_json::json!(true));
}

#[test]
fn snapshot_lists_dependents_per_key() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("a", 1), ("b", 2)])).unwrap();

    let s = state.clone();
    let effect = rt.run_effect(move || {
        let _ = s.get("a");
    });

    let snapshot = rt.graph_snapshot();
    assert_eq!(
        snapshot.dependents_of(state.id(), &PropKey::field("a")),
        Some(&[effect.id()][..])
    );
    assert!(snapshot.dependents_of(state.id(), &PropKey::field("b")).is_none());
}

#[test]
fn recordings_capture_invalidations() {
    let rt = Runtime::new(RuntimeConfig::default().with_recording(true));
    let list = rt.create_reactive_state(Object::from_values([1])).unwrap();

    let l = list.clone();
    let effect = rt.run_effect(move || {
        let _ = l.len();
    });
    list.push(2).unwrap();
    list.set(0usize, 1).unwrap();
    rt.run_until_idle().unwrap();

    let recording = rt.stop_recording();
    assert!(!rt.is_recording());
    assert_eq!(recording.len(), 1);

    let event = &recording.events[0];
    assert_eq!(event.object, list.id());
    assert_eq!(event.keys, vec![PropKey::Index(1), PropKey::Length, PropKey::Shape]);
    assert_eq!(event.computations, vec![effect.id()]);

    let bytes = recording.to_msgpack().unwrap();
    let decoded = Recording::from_msgpack(&bytes).unwrap();
    assert_eq!(decoded.events[0].keys, event.keys);
}

#[test]
fn runtimes_do_not_share_dependencies() {
    let (rt_a, rt_b) = (Runtime::default(), Runtime::default());
    let state = rt_b.create_reactive_state(Object::from_fields([("x", 0)])).unwrap();

    let s = state.clone();
    let effect = rt_a.run_effect(move || {
        let _ = s.get("x");
    });

    state.set("x", 1).unwrap();
    assert_eq!(rt_a.run_until_idle().unwrap(), 0);
    assert_eq!(rt_b.run_until_idle().unwrap(), 0);
    assert_eq!(effect.run_count(), 1);
}

#[test]
fn free_functions_use_the_thread_runtime() {
    let state = trellis_core::create_reactive_state(Object::from_fields([("n", 0)])).unwrap();

    let (seen, out) = log();
    let s = state.clone();
    let effect = trellis_core::run_effect(move || {
        out.lock().push(int(&s, "n"));
    });

    state.set("n", 5).unwrap();
    assert_eq!(trellis_core::run_until_idle().unwrap(), 1);
    assert_eq!(*seen.lock(), vec![Some(0), Some(5)]);
    assert!(state.runtime().ptr_eq(&Runtime::current()));
    effect.dispose();
}

/// Inserting at the front moves every index and returns the new length.
#[test]
fn unshift_notifies_every_moved_index() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([3])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    let third = rt.run_effect(move || {
        out.lock().push(at(&l, 2));
    });
    let l = list.clone();
    let length_reader = rt.run_effect(move || {
        let _ = l.len();
    });

    assert_eq!(list.unshift_all([1, 2]).unwrap(), 3);
    rt.run_until_idle().unwrap();
    assert_eq!(list.unshift(0).unwrap(), 4);
    rt.run_until_idle().unwrap();

    assert_eq!(contents(&list), ints(&[0, 1, 2, 3]));
    assert_eq!(*seen.lock(), vec![None, Some(3), Some(2)]);
    assert_eq!(third.run_count(), 3);
    assert_eq!(length_reader.run_count(), 3);

    // Nothing inserted, nothing notified.
    assert_eq!(list.unshift_all(Vec::<i64>::new()).unwrap(), 4);
    assert!(!rt.is_flush_scheduled());
}

#[test]
fn copy_within_overwrites_in_place_and_clamps() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3, 4, 5])).unwrap();

    let l = list.clone();
    let length_reader = rt.run_effect(move || {
        let _ = l.len();
    });

    // Overlapping ranges copy the source as it was before the call.
    assert!(list.copy_within(0..3, 2).unwrap().ptr_eq(&list));
    assert_eq!(contents(&list), ints(&[1, 2, 1, 2, 3]));

    list.copy_within(3.., 0).unwrap();
    assert_eq!(contents(&list), ints(&[2, 3, 1, 2, 3]));

    // Copies running past the end are cut short.
    list.copy_within(0..3, 4).unwrap();
    assert_eq!(contents(&list), ints(&[2, 3, 1, 2, 2]));
    list.copy_within(2..100, 10).unwrap();
    assert_eq!(contents(&list), ints(&[2, 3, 1, 2, 2]));

    let returned = list
        .invoke("copyWithin", &[Value::from(0), Value::from(-2)])
        .unwrap()
        .into_object()
        .unwrap();
    assert!(returned.ptr_eq(&list));
    assert_eq!(contents(&list), ints(&[2, 2, 1, 2, 2]));

    rt.run_until_idle().unwrap();
    assert_eq!(length_reader.run_count(), 2);
}

#[test]
fn fill_overwrites_the_clamped_range() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([0, 0, 0, 0])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    let last = rt.run_effect(move || {
        out.lock().push(at(&l, 3));
    });

    assert!(list.fill(7, 1..=2).unwrap().ptr_eq(&list));
    assert_eq!(contents(&list), ints(&[0, 7, 7, 0]));

    list.fill(9, 10..).unwrap();
    assert_eq!(contents(&list), ints(&[0, 7, 7, 0]));

    let returned = list.invoke("fill", &[Value::from(5), Value::from(-1)]).unwrap();
    assert!(returned.into_object().unwrap().ptr_eq(&list));
    assert_eq!(contents(&list), ints(&[0, 7, 7, 5]));

    rt.run_until_idle().unwrap();
    assert_eq!(last.run_count(), 2);
    assert_eq!(*seen.lock(), vec![Some(0), Some(5)]);
}

/// An arbitrary mutation notifies every reader of the sequence.
#[test]
fn mutate_with_invalidates_the_whole_sequence() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3, 4])).unwrap();
    let other = rt.create_reactive_state(Object::from_values([1])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    let reader = rt.run_effect(move || {
        out.lock().push((at(&l, 0), at(&l, 3)));
    });
    let o = other.clone();
    let bystander = rt.run_effect(move || {
        let _ = o.get(0usize);
    });

    let kept = list
        .mutate_with(|items| {
            items.retain(|v| v.as_i64().is_some_and(|n| n % 2 == 0));
            items.len()
        })
        .unwrap();
    assert_eq!(kept, 2);
    rt.run_until_idle().unwrap();

    assert_eq!(contents(&list), ints(&[2, 4]));
    assert_eq!(*seen.lock(), vec![(Some(1), Some(4)), (Some(2), None)]);
    assert_eq!(reader.run_count(), 2);
    assert_eq!(bystander.run_count(), 1);

    let record = rt.create_reactive_state(Object::record()).unwrap();
    assert!(matches!(
        record.mutate_with(|items| items.clear()),
        Err(StateError::KindMismatch { .. })
    ));
}

#[test]
fn resizing_notifies_length_and_vacated_slots() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3])).unwrap();

    let (slots, out) = log();
    let l = list.clone();
    rt.run_effect(move || {
        out.lock().push(l.get(4usize).map(|p| p.is_null()));
    });
    let (lengths, out) = log();
    let l = list.clone();
    rt.run_effect(move || {
        out.lock().push(l.len());
    });

    list.set("length", 5).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(contents(&list), vec![Value::from(1), Value::from(2), Value::from(3), Value::Null, Value::Null]);

    list.truncate(10).unwrap();
    assert!(!rt.is_flush_scheduled());

    list.truncate(2).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(contents(&list), ints(&[1, 2]));

    list.clear().unwrap();
    rt.run_until_idle().unwrap();
    assert!(contents(&list).is_empty());

    assert_eq!(*slots.lock(), vec![None, Some(true), None]);
    assert_eq!(*lengths.lock(), vec![3, 5, 2, 0]);
    assert!(matches!(list.set("length", -1), Err(StateError::InvalidArguments { .. })));
}

/// Removing or inserting in the middle moves the tail.
#[test]
fn unbalanced_splice_notifies_tail_readers() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3, 4])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    rt.run_effect(move || {
        out.lock().push(at(&l, 3));
    });

    let removed = list.splice(0, 1, std::iter::empty::<i64>()).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].as_i64(), Some(1));
    rt.run_until_idle().unwrap();

    assert!(list.splice(1, 0, [9, 9]).unwrap().is_empty());
    rt.run_until_idle().unwrap();

    assert_eq!(contents(&list), ints(&[2, 9, 9, 3, 4]));
    assert_eq!(*seen.lock(), vec![Some(4), None, Some(3)]);
}

/// Whole-container reads follow element writes and shape changes.
#[test]
fn iteration_tracks_items_and_shape() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1, 2, 3])).unwrap();

    let (seen, out) = log();
    let l = list.clone();
    let iterating = rt.run_effect(move || {
        out.lock().push(l.iter().filter_map(|p| p.as_i64()).collect::<Vec<_>>());
    });

    list.set(1usize, 20).unwrap();
    rt.run_until_idle().unwrap();
    list.set(1usize, 20).unwrap();
    rt.run_until_idle().unwrap();
    list.push(4).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(iterating.run_count(), 3);
    assert_eq!(*seen.lock(), vec![vec![1, 2, 3], vec![1, 20, 3], vec![1, 20, 3, 4]]);

    let record = rt.create_reactive_state(Object::from_fields([("a", 1)])).unwrap();
    let r = record.clone();
    let key_reader = rt.run_effect(move || {
        let _ = r.keys();
    });
    record.set("a", 2).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(key_reader.run_count(), 1);
    record.set("b", 1).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(key_reader.run_count(), 2);
}

/// A computation failing on its first run is reported and stays registered.
#[test]
fn initial_run_failures_reach_the_channel() {
    let rt = Runtime::default();
    let state = rt.create_reactive_state(Object::from_fields([("x", 0)])).unwrap();

    let (errors, sink) = log();
    rt.set_error_handler(move |err: &ComputationError| sink.lock().push((err.phase, err.is_panic())));

    let s = state.clone();
    let failing = rt.run_effect(move || -> Result<(), io::Error> {
        let _ = s.get("x");
        Err(io::Error::new(io::ErrorKind::Other, "not ready"))
    });
    let panicking = rt.run_effect::<_, ()>(|| panic!("bad setup"));

    assert_eq!(
        *errors.lock(),
        vec![(RunPhase::Initial, false), (RunPhase::Initial, true)]
    );
    assert!(!failing.is_disposed());
    assert!(!panicking.is_disposed());
    assert_eq!(rt.computation_count(), 2);

    state.set("x", 1).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(failing.run_count(), 2);
    assert_eq!(errors.lock().last().copied(), Some((RunPhase::Flush, false)));
}

#[test]
fn oversized_sequences_are_rejected() {
    let rt = Runtime::default();
    let list = rt.create_reactive_state(Object::from_values([1])).unwrap();

    assert!(matches!(list.set(usize::MAX, 5), Err(StateError::InvalidArguments { .. })));
    assert!(matches!(list.set("length", i64::MAX), Err(StateError::InvalidArguments { .. })));
    assert_eq!(list.len(), 1);
    assert!(!rt.is_flush_scheduled());

    let small = Runtime::new(RuntimeConfig::default().with_max_sequence_len(3));
    let list = small.create_reactive_state(Object::from_values([1, 2])).unwrap();
    assert_eq!(list.push(3).unwrap(), 3);
    assert!(list.push(4).is_err());
    assert!(list.unshift(0).is_err());
    assert!(list.splice(0, 0, [0]).is_err());
    assert!(list.set_len(4).is_err());
    assert!(list.set(3usize, 4).is_err());
    assert_eq!(list.splice(0, 1, [0]).unwrap().len(), 1);
    assert_eq!(contents(&list), ints(&[0, 2, 3]));
}

/// Swapping a float for an integer of nearly the same value is a real change.
#[test]
fn numeric_writes_compare_by_variant() {
    let rt = Runtime::default();
    let state = rt
        .create_reactive_state(Object::from_fields([("n", 9_007_199_254_740_992.0)]))
        .unwrap();

    let s = state.clone();
    let effect = rt.run_effect(move || {
        let _ = s.get("n");
    });

    state.set("n", 9_007_199_254_740_993i64).unwrap();
    rt.run_until_idle().unwrap();

    assert!(matches!(state.target().field("n"), Some(Value::Int(9_007_199_254_740_993))));
    assert_eq!(effect.run_count(), 2);

    state.set("n", 9_007_199_254_740_993i64).unwrap();
    assert!(!rt.is_flush_scheduled());
}
