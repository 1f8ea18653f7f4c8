//! End-to-end lifecycle scenarios against the in-memory recording backend.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::thread;
use std::time::Duration;

use futures_executor::block_on;
use trace_lifecycle::testing::{RecordingBackend, TestPromise};
use trace_lifecycle::{Config, LifecycleEngine, SpanId, TraceContext, TraceId};

fn engine_with_rate(backend: &RecordingBackend, rate: f64) -> LifecycleEngine {
    LifecycleEngine::new(
        Arc::new(backend.clone()),
        Config::default().with_sampling_rate(rate),
    )
}

#[test]
fn checkout_scenario_closes_both_spans_and_links_child_to_root() {
    let backend = RecordingBackend::new();
    let engine = LifecycleEngine::new(
        Arc::new(backend.clone()),
        Config::default()
            .with_sampling_rate(1.0)
            .with_cache_ttl(Duration::from_millis(50)),
    );

    let trace_id = engine.trace_root("checkout", || {
        let root_cx = engine.current_context().expect("checkout is active");
        engine.trace_child("payment", Some(&root_cx), || {
            assert_eq!(
                engine.current_context().unwrap().trace_id(),
                root_cx.trace_id()
            );
        });
        root_cx.trace_id()
    });

    let finished = backend.finished_spans();
    assert_eq!(finished.len(), 2);
    let payment = &finished[0];
    let checkout = &finished[1];
    assert_eq!(payment.name, "payment");
    assert_eq!(checkout.name, "checkout");
    assert_eq!(
        payment.parent.as_ref().map(|p| p.span_id()),
        Some(checkout.context.span_id())
    );

    // the root frame lingers until the trace entry expires
    assert_eq!(engine.active_span_count(trace_id), Some(1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(engine.active_span_count(trace_id), None);
}

#[test]
fn sampled_out_trace_makes_no_backend_calls() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 0.0);

    engine.trace_root("checkout", || {
        assert!(!engine.is_trace_active());
        assert!(engine.current_context().is_none());
        engine.trace_child("payment", None, || {
            assert!(!engine.is_trace_active());
        });
    });

    assert_eq!(backend.started_count(), 0);
    assert!(backend.finished_spans().is_empty());
}

#[test]
fn sampling_rate_converges_over_many_roots() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 0.5);

    let trials = 2_000;
    for _ in 0..trials {
        engine.trace_root("flip", || {});
    }
    let started = backend.started_count();
    assert!(
        (800..=1200).contains(&started),
        "started {started} of {trials}"
    );

    let all = RecordingBackend::new();
    let always = engine_with_rate(&all, 1.0);
    for _ in 0..100 {
        always.trace_root("kept", || {});
    }
    assert_eq!(all.started_count(), 100);
}

#[test]
fn closing_a_never_associated_object_is_a_no_op() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);
    let stranger = Arc::new("never seen".to_string());

    engine.close_correlated(&stranger);
    assert!(backend.finished_spans().is_empty());
    assert!(engine.context_for(&stranger).is_none());
}

#[test]
fn close_correlated_is_idempotent() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);
    let response = Arc::new(1234u64);

    engine.trace_root("request", || {
        engine.open_correlated("reply", None, &response, || {});
        assert!(engine.context_for(&response).is_some());
    });

    engine.close_correlated(&response);
    assert!(engine.context_for(&response).is_none());
    let after_first = backend.finished_spans().len();

    engine.close_correlated(&response);
    assert_eq!(backend.finished_spans().len(), after_first);
}

#[test]
fn cross_thread_children_stack_and_remove_independently() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    engine.trace_root("root", || {
        let root_cx = engine.current_context().unwrap();
        let trace_id = root_cx.trace_id();
        assert_eq!(engine.active_span_count(trace_id), Some(1));

        // two children on two other threads, completing out of start order
        thread::scope(|scope| {
            let first = scope.spawn(|| {
                engine.trace_child("first", Some(&root_cx), || {
                    assert!(engine.active_span_count(trace_id).unwrap() >= 2);
                });
            });
            let second = scope.spawn(|| {
                engine.trace_child("second", Some(&root_cx), || {
                    assert!(engine.active_span_count(trace_id).unwrap() >= 2);
                });
            });
            first.join().unwrap();
            second.join().unwrap();
        });

        // both child frames removed by identity, root frame untouched
        assert_eq!(engine.active_span_count(trace_id), Some(1));
    });

    assert_eq!(backend.finished_spans().len(), 3);
}

#[test]
fn correlated_span_closes_once_from_another_thread() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);
    let response = Arc::new("response-object".to_string());

    engine.trace_root("serve", || {
        let root_cx = engine.current_context().unwrap();
        let trace_id = root_cx.trace_id();

        // register on a worker thread so the span owns its own stack frame
        thread::scope(|scope| {
            scope
                .spawn(|| {
                    engine.open_correlated("respond", Some(&root_cx), &response, || {});
                })
                .join()
                .unwrap();
        });
        assert_eq!(engine.active_span_count(trace_id), Some(2));

        // completion arrives on yet another thread
        thread::scope(|scope| {
            scope
                .spawn(|| engine.close_correlated(&response))
                .join()
                .unwrap();
        });
        assert_eq!(engine.active_span_count(trace_id), Some(1));
        assert_eq!(backend.finished_spans().len(), 1);
        assert_eq!(backend.finished_spans()[0].name, "respond");
    });

    assert_eq!(backend.finished_spans().len(), 2);
}

#[test]
fn panicking_work_still_closes_its_span() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    let result = catch_unwind(AssertUnwindSafe(|| {
        engine.trace_root("explodes", || panic!("kaboom"));
    }));
    assert!(result.is_err());
    assert_eq!(backend.finished_spans().len(), 1);
    assert_eq!(backend.finished_spans()[0].name, "explodes");
}

/// Future that is pending on its first poll and ready on the second.
struct ReadyOnSecondPoll<T: Clone + Unpin> {
    value: T,
    polled: bool,
}

impl<T: Clone + Unpin> Future for ReadyOnSecondPoll<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<T> {
        if self.polled {
            Poll::Ready(self.value.clone())
        } else {
            self.polled = true;
            task_cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[test]
fn future_span_closes_when_the_future_resolves() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    let traced = engine.trace_root_future("fetch", || ReadyOnSecondPoll {
        value: 7u32,
        polled: false,
    });
    // nothing finished until the future actually completes
    assert!(backend.finished_spans().is_empty());

    assert_eq!(block_on(traced), 7);
    assert_eq!(backend.finished_spans().len(), 1);
    assert_eq!(backend.finished_spans()[0].name, "fetch");
}

#[test]
fn failed_future_still_closes_span_and_propagates_error() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    let traced =
        engine.trace_root_future("fallible", || async { Err::<u32, String>("boom".into()) });
    let result = block_on(traced);

    assert_eq!(result, Err("boom".into()));
    assert_eq!(backend.finished_spans().len(), 1);
}

#[test]
fn child_future_removes_its_stack_frame() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    engine.trace_root("root", || {
        let root_cx = engine.current_context().unwrap();
        let trace_id = root_cx.trace_id();

        thread::scope(|scope| {
            scope
                .spawn(|| {
                    let traced = engine
                        .trace_child_future("io", Some(&root_cx), || async { "done" });
                    assert_eq!(engine.active_span_count(trace_id), Some(2));
                    assert_eq!(block_on(traced), "done");
                })
                .join()
                .unwrap();
        });

        assert_eq!(engine.active_span_count(trace_id), Some(1));
    });

    let finished = backend.finished_spans();
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[0].name, "io");
}

#[test]
fn promise_completion_closes_span_on_either_path() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    let promise: TestPromise<u32, String> =
        engine.trace_root_promise("submit", TestPromise::new);
    assert!(backend.finished_spans().is_empty());
    promise.complete(1);
    assert_eq!(backend.finished_spans().len(), 1);

    let promise: TestPromise<u32, String> =
        engine.trace_root_promise("submit-failing", TestPromise::new);
    promise.fail("denied".into());
    assert_eq!(backend.finished_spans().len(), 2);
}

#[test]
fn promise_firing_both_paths_closes_the_span_once() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    let promise: TestPromise<u32, String> =
        engine.trace_root_promise("rogue", TestPromise::new);
    promise.complete(1);
    promise.fail("late error".into());

    assert_eq!(backend.finished_spans().len(), 1);
}

#[test]
fn process_continuation_inherits_remote_sampling() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 0.0);

    let sampled = TraceContext::new(TraceId::from_u128(77), SpanId::from_u64(3), true);
    engine.trace_process("consume", Some(&sampled), || {
        let cx = engine.current_context().unwrap();
        assert_eq!(cx.trace_id(), sampled.trace_id());
    });
    assert_eq!(backend.finished_spans().len(), 1);

    let unsampled = TraceContext::new(TraceId::from_u128(78), SpanId::from_u64(4), false);
    engine.trace_process("ignored", Some(&unsampled), || {
        assert!(!engine.is_trace_active());
    });
    assert_eq!(backend.started_count(), 1);
}

#[test]
fn correlation_entries_survive_only_while_the_key_does() {
    let backend = RecordingBackend::new();
    let engine = engine_with_rate(&backend, 1.0);

    engine.trace_root("root", || {
        let key = Arc::new(55u8);
        engine.open_correlated("pending", None, &key, || {});
        assert!(engine.context_for(&key).is_some());
    });
    // key dropped with the closure scope: the entry is unreachable and the
    // still-open child waits for eviction. Only the root finished.
    assert_eq!(backend.finished_spans().len(), 1);
}
