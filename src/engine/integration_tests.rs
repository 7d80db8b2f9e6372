// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Settings;
use crate::engine::compose::{append, group, Work};
use crate::engine::{ParallelWork, SeriesWork, SubTaskExt};
use crate::errors::{EngineError, TaskState};
use crate::runtime::Runtime;
use crate::tasks::{CounterTask, EmptyTask, TaskInfo};

fn small_runtime() -> Runtime {
    Runtime::new(Settings {
        compute_threads: 4,
        handler_threads: 2,
        dns_threads: 1,
        file_io_threads: 1,
        poller_threads: 1,
        ..Settings::default()
    })
    .unwrap()
}

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> EmptyTask {
    let log = Arc::clone(log);
    EmptyTask::with_callback(move |_| log.lock().push(label))
}

/// Tasks run in queue order, including ones pushed while the series runs
#[tokio::test]
async fn test_series_runs_tasks_in_queue_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let series = SeriesWork::new(recorder(&log, "b"));
    series.push_front(recorder(&log, "a"));

    let inner_log = Arc::clone(&log);
    series.push_back(EmptyTask::with_callback(move |task| {
        inner_log.lock().push("c");
        let series = task.series().unwrap();
        let pushed_log = Arc::clone(&inner_log);
        series.push_front(EmptyTask::with_callback(move |_| pushed_log.lock().push("c2")));
    }));
    series.push_back(recorder(&log, "d"));

    let done = series.completion();
    series.start().unwrap();
    let outcome = done.await.unwrap();

    assert!(!outcome.canceled);
    assert_eq!(*log.lock(), vec!["a", "b", "c", "c2", "d"]);
}

/// Pool tasks of uneven length still call back in series order
#[tokio::test]
async fn test_series_order_holds_across_pool_threads() {
    let runtime = small_runtime();
    let log = Arc::new(Mutex::new(Vec::new()));
    let series = SeriesWork::empty();
    let steps: [(&'static str, u64); 6] = [
        ("go 30ms", 30),
        ("timer 10ms", 10),
        ("go 0ms", 0),
        ("timer 0ms", 0),
        ("go 15ms", 15),
        ("go 5ms", 5),
    ];
    for (label, millis) in steps {
        let log = Arc::clone(&log);
        if label.starts_with("go") {
            let mut task = runtime.go_task(label, move || {
                std::thread::sleep(Duration::from_millis(millis));
            });
            task.set_callback(move |_| log.lock().push(label));
            series.push_back(task);
        } else {
            let mut task = runtime.timer_task(Duration::from_millis(millis));
            task.set_callback(move |_| log.lock().push(label));
            series.push_back(task);
        }
    }

    let done = series.completion();
    series.start().unwrap();
    tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .unwrap()
        .unwrap();

    let expected: Vec<_> = steps.iter().map(|(label, _)| *label).collect();
    assert_eq!(*log.lock(), expected);
}

/// Every completion handle resolves, not only the latest one
#[tokio::test]
async fn test_every_completion_handle_resolves() {
    let series = SeriesWork::new(EmptyTask::new());
    let first = series.completion();
    let second = series.completion();
    series.start().unwrap();
    let late = series.completion();

    for done in [first, second, late] {
        let outcome = tokio::time::timeout(Duration::from_secs(5), done)
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.canceled);
    }
}

/// A context closure may replace the context it is working on
#[test]
fn test_context_can_be_replaced_from_inside_with_context() {
    let series = SeriesWork::empty();
    series.set_context(1u32);

    let seen = series.with_context(|value: &mut u32| {
        series.set_context(*value + 10);
        *value
    });
    assert_eq!(seen, Some(1));
    assert_eq!(series.take_context::<u32>(), Some(11));

    series.set_context(5u32);
    series.with_context(|value: &mut u32| *value *= 2);
    assert_eq!(series.take_context::<u32>(), Some(10));
    assert_eq!(series.with_context(|value: &mut u32| *value), None);
}

/// Every branch of a parallel group completes exactly once before the group does
#[tokio::test]
async fn test_parallel_branches_complete_exactly_once() {
    let runtime = small_runtime();
    let ran = Arc::new(AtomicUsize::new(0));
    let called_back = Arc::new(AtomicUsize::new(0));

    let mut parallel = ParallelWork::new();
    for _ in 0..16 {
        let ran = Arc::clone(&ran);
        let mut task = runtime.go_task("branch", move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
        let called_back = Arc::clone(&called_back);
        task.set_callback(move |task| {
            assert_eq!(task.state(), TaskState::Success);
            called_back.fetch_add(1, Ordering::SeqCst);
        });
        parallel.add_series(SeriesWork::new(task)).unwrap();
    }

    let joined = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&called_back);
    let joined_in_callback = Arc::clone(&joined);
    parallel.set_callback(move |parallel| {
        assert_eq!(parallel.len(), 16);
        assert_eq!(seen.load(Ordering::SeqCst), 16);
        joined_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    let series = SeriesWork::new(parallel);
    let done = series.completion();
    series.start().unwrap();
    tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 16);
    assert_eq!(called_back.load(Ordering::SeqCst), 16);
    assert_eq!(joined.load(Ordering::SeqCst), 1);
}

/// Three no-op tasks share the series context and report through the series callback
#[tokio::test]
async fn test_tasks_share_series_context() {
    let series = SeriesWork::empty();
    series.set_context(0u32);
    for _ in 0..3 {
        series.push_back(EmptyTask::with_callback(|task| {
            task.series()
                .unwrap()
                .with_context(|count: &mut u32| *count += 1)
                .unwrap();
        }));
    }

    let total = Arc::new(AtomicUsize::new(0));
    let total_in_callback = Arc::clone(&total);
    series.set_callback(move |series| {
        let count = series.take_context::<u32>().unwrap();
        total_in_callback.store(count as usize, Ordering::SeqCst);
    });

    let done = series.completion();
    series.start().unwrap();
    done.await.unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 3);
}

/// Canceling dismisses the tasks that have not started; the series callback still runs
#[tokio::test]
async fn test_cancel_dismisses_pending_tasks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let series = SeriesWork::new(EmptyTask::with_callback(|task| {
        task.series().unwrap().cancel();
    }));
    series.push_back(recorder(&log, "never"));
    series.push_back(recorder(&log, "never either"));

    let finished = Arc::new(AtomicUsize::new(0));
    let finished_in_callback = Arc::clone(&finished);
    series.set_callback(move |series| {
        assert!(series.is_canceled());
        finished_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    let done = series.completion();
    series.start().unwrap();
    let outcome = done.await.unwrap();

    assert!(outcome.canceled);
    assert!(log.lock().is_empty());
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(series.pending(), 0);
}

/// Tasks pushed from the series callback never run
#[tokio::test]
async fn test_tasks_pushed_from_series_callback_are_dismissed() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let series = SeriesWork::new(recorder(&log, "first"));
    let late_log = Arc::clone(&log);
    series.set_callback(move |series| {
        series.push_back(recorder(&late_log, "late"));
    });

    let done = series.completion();
    series.start().unwrap();
    done.await.unwrap();
    assert_eq!(*log.lock(), vec!["first"]);
}

/// A dismissed task never calls back
#[test]
fn test_dismissed_task_is_silent() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_callback = Arc::clone(&fired);
    let task = EmptyTask::with_callback(move |_| {
        fired_in_callback.fetch_add(1, Ordering::SeqCst);
    });
    task.dismiss();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

/// A long chain of synchronous tasks completes without growing the stack
#[test]
fn test_long_synchronous_chain() {
    let count = Arc::new(AtomicUsize::new(0));
    let series = SeriesWork::empty();
    for _ in 0..50_000 {
        let count = Arc::clone(&count);
        series.push_back(EmptyTask::with_callback(move |_| {
            count.fetch_add(1, Ordering::Relaxed);
        }));
    }
    let done = series.completion();
    series.start().unwrap();
    done.wait().unwrap();
    assert_eq!(count.load(Ordering::Relaxed), 50_000);
}

/// Misuse is reported instead of corrupting the graph
#[test]
fn test_start_misuse_is_rejected() {
    let series = SeriesWork::new(EmptyTask::new());
    series.start().unwrap();
    assert_eq!(series.start(), Err(EngineError::SeriesAlreadyStarted));

    let branch = SeriesWork::new(EmptyTask::new());
    let mut parallel = ParallelWork::new();
    parallel.add_series(branch.clone()).unwrap();
    assert_eq!(branch.start(), Err(EngineError::SeriesOwnedByParallel));

    let mut other = ParallelWork::new();
    assert_eq!(other.add_series(branch), Err(EngineError::SeriesAlreadyGrouped));
}

/// A group with no branches completes as soon as it is dispatched
#[tokio::test]
async fn test_empty_parallel_completes_immediately() {
    let joined = Arc::new(AtomicUsize::new(0));
    let mut parallel = ParallelWork::new();
    let joined_in_callback = Arc::clone(&joined);
    parallel.set_callback(move |_| {
        joined_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    let series = SeriesWork::new(parallel);
    let done = series.completion();
    series.start().unwrap();
    done.await.unwrap();
    assert_eq!(joined.load(Ordering::SeqCst), 1);
}

/// Composed graph: a timer, then a fan-out where one branch releases a gate
/// the other branch waits on, then a final task
#[tokio::test]
async fn test_nested_graph_built_with_compose() {
    let runtime = small_runtime();
    let log = Arc::new(Mutex::new(Vec::new()));

    let gate = CounterTask::new(1);
    let gate_handle = gate.handle();
    let waiting = SeriesWork::new(gate);
    waiting.push_back(recorder(&log, "gate opened"));

    let releasing = SeriesWork::new(runtime.go_task("release", move || gate_handle.count()));

    let fan_out = group(waiting, releasing).unwrap();
    let graph = append(Work::task(runtime.timer_task(Duration::from_millis(5))), fan_out).unwrap();
    let graph = append(graph, Work::task(recorder(&log, "done"))).unwrap();

    let done = graph.completion();
    graph.start().unwrap();
    tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(*log.lock(), vec!["gate opened", "done"]);
}
