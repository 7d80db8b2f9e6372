// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::engine::{ParallelWork, SeriesWork, SubTaskExt};
use crate::errors::{TaskErrorCode, TaskState, TimeoutReason};
use crate::tasks::{TaskInfo, Target};
use crate::traits::DecodeStatus;
use crate::upstream::{AddressParams, RouteKey, SelectPolicy, UpstreamResult};

/// Response that is complete at the first newline.
#[derive(Default, Debug)]
struct Line(Vec<u8>);

impl InboundMessage for Line {
    fn append(&mut self, data: &[u8]) -> io::Result<DecodeStatus> {
        self.0.extend_from_slice(data);
        if self.0.contains(&b'\n') {
            Ok(DecodeStatus::Complete)
        } else {
            Ok(DecodeStatus::Incomplete)
        }
    }
}

/// Resolves `echo.test` to a fixed address and nothing else.
struct StaticResolver(SocketAddr);

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
        if host == "echo.test" {
            Ok(vec![self.0])
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "unknown host"))
        }
    }
}

fn small_settings() -> Settings {
    Settings {
        compute_threads: 2,
        handler_threads: 2,
        dns_threads: 1,
        file_io_threads: 1,
        poller_threads: 1,
        ..Settings::default()
    }
}

fn runtime_with_echo() -> (Runtime, SocketAddr) {
    let addr = echo_server();
    let runtime = Runtime::with_resolver(small_settings(), Arc::new(StaticResolver(addr))).unwrap();
    (runtime, addr)
}

fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || {
                let mut writer = stream.try_clone().unwrap();
                for line in BufReader::new(stream).lines() {
                    let Ok(line) = line else { break };
                    if writer.write_all(format!("{}\n", line).as_bytes()).is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

struct NetReport {
    state: TaskState,
    error: i32,
    timeout_reason: TimeoutReason,
    peer: Option<SocketAddr>,
    response: Vec<u8>,
}

/// Run one line exchange and collect what its callback saw.
fn exchange(runtime: &Runtime, mut task: NetworkTask<Vec<u8>, Line>) -> NetReport {
    let (tx, rx) = mpsc::channel();
    task.set_callback(move |task| {
        let _ = tx.send(NetReport {
            state: task.state(),
            error: task.error(),
            timeout_reason: task.timeout_reason(),
            peer: task.peer_addr(),
            response: task.take_response().0,
        });
    });
    assert!(!runtime.is_shut_down());
    task.start().completion().wait().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn go_task_runs_on_a_compute_thread() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let (tx, rx) = mpsc::channel();
    let mut task = runtime.go_task("names", move || {
        let name = thread::current().name().unwrap_or("").to_string();
        tx.send(name).unwrap();
    });
    task.set_callback(|task| assert_eq!(task.state(), TaskState::Success));
    assert_eq!(task.queue_name(), "names");

    task.start().completion().wait().unwrap();
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(name.starts_with("workloom-compute-"), "ran on {}", name);
}

#[test]
fn panicking_go_work_still_completes_the_series() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let (tx, rx) = mpsc::channel();
    let mut task = runtime.go_task("fragile", || panic!("user work failed"));
    task.set_callback(move |task| tx.send((task.state(), task.error())).unwrap());

    let series = task.start();
    let done = series.completion();
    let (state, error) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(state, TaskState::TaskError);
    assert_eq!(error, TaskErrorCode::RoutinePanicked.code());
    assert!(done.wait().is_some());

    // The compute thread survived and keeps serving the queue.
    let (tx, rx) = mpsc::channel();
    runtime
        .go_task("fragile", move || tx.send(()).unwrap())
        .start();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
}

#[test]
fn panicking_branch_routine_does_not_stall_its_parallel_group() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let states = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut parallel = ParallelWork::new();
    for fail in [false, true, false] {
        let mut task = runtime.thread_task("branches", fail, |fail: &bool, out: &mut u32| {
            if *fail {
                panic!("routine failed");
            }
            *out = 1;
        });
        let states = Arc::clone(&states);
        task.set_callback(move |task| states.lock().push(task.state()));
        parallel.add_series(SeriesWork::new(task)).unwrap();
    }

    let series = SeriesWork::new(parallel);
    let done = series.completion();
    series.start().unwrap();
    assert!(done.wait().is_some());

    let mut states = states.lock().clone();
    states.sort_by_key(|state| state.code());
    assert_eq!(
        states,
        vec![TaskState::Success, TaskState::Success, TaskState::TaskError]
    );
}

#[test]
fn thread_task_hands_its_output_to_the_callback() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let (tx, rx) = mpsc::channel();
    let mut task = runtime.thread_task("sum", vec![1u64, 2, 3, 4], |input: &Vec<u64>, out: &mut u64| {
        *out = input.iter().sum();
    });
    task.set_callback(move |task| tx.send(task.take_output()).unwrap());

    task.start().completion().wait().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 10);
}

#[test]
fn timer_task_completes_after_its_delay() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let started = Instant::now();
    let (tx, rx) = mpsc::channel();
    let mut task = runtime.timer_task(Duration::from_millis(40));
    task.set_callback(move |task| tx.send(task.state()).unwrap());

    task.start().completion().wait().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), TaskState::Success);
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn series_completion_can_be_awaited() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let series = SeriesWork::new(runtime.timer_task(Duration::from_millis(10)));
    series.push_back(runtime.go_task("after", || {}));

    let done = series.completion();
    series.start().unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .unwrap()
        .unwrap();
    assert!(!outcome.canceled);
}

#[test]
fn named_counter_is_released_by_count_by_name() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let series = SeriesWork::new(runtime.named_counter_task("gate", 2));
    let done = series.completion();
    series.start().unwrap();

    assert_eq!(runtime.count_by_name("gate", 1), 1);
    assert_eq!(runtime.count_by_name("gate", 3), 1);
    assert!(done.wait().is_some());
    assert_eq!(runtime.count_by_name("gate", 1), 0);
}

#[test]
fn pwrite_then_pread_round_trip_through_a_series() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let file = Arc::new(
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(tmp.path())
            .unwrap(),
    );

    let (tx, rx) = mpsc::channel();
    let mut write = runtime.pwrite_task(Arc::clone(&file), 4, b"loom".to_vec());
    write.set_callback(|task| {
        assert_eq!(task.state(), TaskState::Success);
        assert_eq!(task.transferred(), 4);
    });
    let mut read = runtime.pread_task(Arc::clone(&file), 4, 16);
    read.set_callback(move |task| tx.send(task.take_buffer()).unwrap());

    let series = SeriesWork::new(write);
    series.push_back(read);
    let done = series.completion();
    series.start().unwrap();
    done.wait().unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), b"loom");
}

#[test]
fn pwrite_on_a_read_only_file_is_a_system_error() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let file = Arc::new(File::open(tmp.path()).unwrap());

    let (tx, rx) = mpsc::channel();
    let mut write = runtime.pwrite_task(file, 0, b"nope".to_vec());
    write.set_callback(move |task| tx.send((task.state(), task.error())).unwrap());
    write.start().completion().wait().unwrap();

    let (state, error) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(state, TaskState::SysError);
    assert_ne!(error, 0);
}

#[test]
fn pwritev_then_preadv_split_the_same_bytes_differently() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let file = Arc::new(
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(tmp.path())
            .unwrap(),
    );

    let mut write = runtime.pwritev_task(Arc::clone(&file), 0, vec![b"task".to_vec(), b"graph".to_vec()]);
    write.set_callback(|task| {
        assert_eq!(task.state(), TaskState::Success);
        assert_eq!(task.transferred(), 9);
    });
    let (tx, rx) = mpsc::channel();
    let mut read = runtime.preadv_task(Arc::clone(&file), 0, &[2, 5, 8]);
    read.set_callback(move |task| tx.send((task.transferred(), task.take_vectors())).unwrap());

    let series = SeriesWork::new(write);
    series.push_back(read);
    let done = series.completion();
    series.start().unwrap();
    done.wait().unwrap();

    let (transferred, vectors) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(transferred, 9);
    assert_eq!(vectors, vec![b"ta".to_vec(), b"skgra".to_vec(), b"ph".to_vec()]);
}

#[test]
fn multi_thread_task_reports_every_input_in_order() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let mut task = runtime.multi_thread_task("squares", vec![1u64, 2, 3, 4, 5], |n: &u64, out: &mut u64| {
        thread::sleep(Duration::from_millis(10 * (5 - *n)));
        *out = n * n;
    });
    assert_eq!(task.len(), 5);
    let (tx, rx) = mpsc::channel();
    task.set_callback(move |parallel, outcomes| {
        assert_eq!(parallel.len(), 5);
        tx.send(outcomes).unwrap();
    });

    task.start().completion().wait().unwrap();
    let outcomes = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(outcomes.iter().all(|outcome| outcome.state == TaskState::Success));
    let squares: Vec<u64> = outcomes.into_iter().map(|outcome| outcome.output).collect();
    assert_eq!(squares, vec![1, 4, 9, 16, 25]);
}

#[test]
fn multi_thread_task_over_no_inputs_calls_back_with_nothing() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let mut task = runtime.multi_thread_task("none", Vec::<u8>::new(), |_: &u8, _: &mut u8| {});
    let (tx, rx) = mpsc::channel();
    task.set_callback(move |_, outcomes| tx.send(outcomes.len()).unwrap());

    task.start().completion().wait().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
}

#[test]
fn sort_then_merge_on_compute_threads() {
    let runtime = Runtime::new(small_settings()).unwrap();
    let (tx, rx) = mpsc::channel();
    let mut sort = runtime.sort_task("algo", vec![9, 4, 7, 1]);
    let merge_runtime = runtime.handle();
    sort.set_callback(move |task| {
        let sorted = task.take_output();
        let mut merge = merge_runtime.merge_task("algo", sorted, vec![2, 8]);
        merge.set_callback(move |task| tx.send(task.take_output()).unwrap());
        task.series().unwrap().push_back(merge);
    });

    sort.start().completion().wait().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), vec![1, 2, 4, 7, 8, 9]);
}

#[test]
fn dns_task_asks_the_resolver_and_skips_the_cache() {
    let (runtime, addr) = runtime_with_echo();
    let (tx, rx) = mpsc::channel();
    let mut task = runtime.dns_task("echo.test", addr.port());
    task.set_callback(move |task| tx.send((task.state(), task.take_addresses())).unwrap());

    task.start().completion().wait().unwrap();
    let (state, addresses) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(state, TaskState::Success);
    assert_eq!(addresses, vec![addr]);
    assert!(runtime.dns_cache().get("echo.test", addr.port()).is_none());
}

#[test]
fn dns_task_for_an_unknown_host_is_a_dns_error() {
    let (runtime, _) = runtime_with_echo();
    let (tx, rx) = mpsc::channel();
    let mut task = runtime.dns_task("nowhere.test", 80);
    task.set_callback(move |task| tx.send((task.state(), task.addresses().len())).unwrap());

    task.start().completion().wait().unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        (TaskState::DnsError, 0)
    );
}

#[test]
fn network_task_talks_to_a_literal_address() {
    let (runtime, addr) = runtime_with_echo();
    let task = runtime.network_task(Target::new("127.0.0.1", addr.port()), b"hello\n".to_vec());

    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::Success);
    assert_eq!(report.response, b"hello\n");
    assert_eq!(report.peer, Some(addr));
    assert_eq!(report.timeout_reason, TimeoutReason::NotTimeout);
}

#[test]
fn network_task_resolves_names_through_the_cache() {
    let (runtime, addr) = runtime_with_echo();
    let uri = format!("tcp://echo.test:{}/", addr.port());
    let task = runtime.network_task_uri(&uri, b"named\n".to_vec());

    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::Success);
    assert_eq!(report.response, b"named\n");
    assert!(runtime.dns_cache().get("echo.test", addr.port()).is_some());
}

#[test]
fn unresolvable_name_is_a_dns_error() {
    let (runtime, _) = runtime_with_echo();
    let task = runtime.network_task(Target::new("nowhere.test", 80), b"x\n".to_vec());

    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::DnsError);
    assert!(report.peer.is_none());
}

#[test]
fn malformed_uri_fails_with_its_framework_code() {
    let (runtime, _) = runtime_with_echo();
    let task = runtime.network_task_uri("http://127.0.0.1:80/", b"x\n".to_vec());
    assert!(task.target().is_none());

    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::TaskError);
    assert_eq!(report.error, TaskErrorCode::UriSchemeInvalid.code());
}

#[test]
fn upstream_group_routes_to_its_server() {
    let (runtime, addr) = runtime_with_echo();
    runtime
        .upstreams()
        .create_group("svc", SelectPolicy::WeightedRandom)
        .unwrap();
    runtime
        .upstreams()
        .add_server("svc", &addr.to_string(), None)
        .unwrap();

    let task = runtime.network_task(Target::new("svc", 0), b"routed\n".to_vec());
    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::Success);
    assert_eq!(report.peer, Some(addr));
}

#[test]
fn portless_upstream_server_uses_the_target_port() {
    let (runtime, addr) = runtime_with_echo();
    runtime
        .upstreams()
        .create_group("svc.local", SelectPolicy::WeightedRandom)
        .unwrap();
    runtime
        .upstreams()
        .add_server("svc.local", "127.0.0.1", None)
        .unwrap();

    let task = runtime.network_task(Target::new("svc.local", addr.port()), b"no port\n".to_vec());
    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::Success);
    assert_eq!(report.response, b"no port\n");
    assert_eq!(report.peer, Some(addr));
}

#[test]
fn group_without_eligible_servers_is_upstream_unavailable() {
    let (runtime, _) = runtime_with_echo();
    runtime
        .upstreams()
        .create_group("empty", SelectPolicy::WeightedRandom)
        .unwrap();

    let task = runtime.network_task(Target::new("empty", 0), b"x\n".to_vec());
    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::TaskError);
    assert_eq!(report.error, TaskErrorCode::UpstreamUnavailable.code());
}

#[test]
fn failed_exchange_excludes_the_upstream_server() {
    let (runtime, _) = runtime_with_echo();
    let dead = refused_addr();
    runtime
        .upstreams()
        .create_group("flaky", SelectPolicy::WeightedRandom)
        .unwrap();
    let params = AddressParams {
        max_fails: 1,
        ..AddressParams::default()
    };
    runtime
        .upstreams()
        .add_server("flaky", &dead.to_string(), Some(params))
        .unwrap();

    let task = runtime.network_task(Target::new("flaky", 0), b"x\n".to_vec());
    let report = exchange(&runtime, task);
    assert_eq!(report.state, TaskState::SysError);
    assert!(matches!(
        runtime.upstreams().choose("flaky", &RouteKey::default()),
        UpstreamResult::AllDown
    ));
}

#[test]
fn tasks_started_after_shutdown_fail_with_shutdown_code() {
    let runtime = Runtime::new(small_settings()).unwrap();
    runtime.shutdown();
    runtime.shutdown();

    let (tx, rx) = mpsc::channel();
    let mut task = runtime.go_task("late", || {});
    task.set_callback(move |task| tx.send((task.state(), task.error())).unwrap());
    task.start();

    let (state, error) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(state, TaskState::TaskError);
    assert_eq!(error, TaskErrorCode::RuntimeShutDown.code());
}
