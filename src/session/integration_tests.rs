// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use super::*;
use crate::errors::{TaskState, TimeoutReason, ETIMEDOUT};
use crate::mux::Multiplexer;
use crate::timer::TimerService;

type Report = (SocketAddr, Outcome, Vec<u8>);

/// Line-oriented exchange: the response is complete at the first newline.
struct LineExchange {
    request: Vec<u8>,
    response: Vec<u8>,
    report: mpsc::Sender<Report>,
}

impl LineExchange {
    fn boxed(request: &str, report: &mpsc::Sender<Report>) -> Box<dyn Exchange> {
        Box::new(Self {
            request: request.as_bytes().to_vec(),
            response: Vec::new(),
            report: report.clone(),
        })
    }
}

impl Exchange for LineExchange {
    fn encode(&mut self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.extend_from_slice(&self.request);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> io::Result<DecodeStatus> {
        self.response.extend_from_slice(data);
        if self.response.contains(&b'\n') {
            Ok(DecodeStatus::Complete)
        } else {
            Ok(DecodeStatus::Incomplete)
        }
    }

    fn finish(self: Box<Self>, peer: SocketAddr, outcome: Outcome) {
        let _ = self.report.send((peer, outcome, self.response));
    }
}

/// Echoes every line back. Returns the address and a counter of accepted connections.
fn echo_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            counter.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || {
                let mut writer = stream.try_clone().unwrap();
                let reader = BufReader::new(stream);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if writer.write_all(format!("{}\n", line).as_bytes()).is_err() {
                        break;
                    }
                }
            });
        }
    });
    (addr, accepted)
}

/// Accepts connections and never answers.
fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            held.push(stream);
        }
    });
    addr
}

fn scheduler(max_connections: usize) -> Arc<CommScheduler> {
    let mux = Arc::new(Multiplexer::new(2).unwrap());
    let timer = Arc::new(TimerService::new().unwrap());
    CommScheduler::new(mux, timer, max_connections)
}

fn timeouts(keep_alive_ms: Option<u64>) -> SessionTimeouts {
    SessionTimeouts {
        connect: Some(Duration::from_secs(2)),
        send: Some(Duration::from_secs(2)),
        receive: Some(Duration::from_secs(2)),
        response: Some(Duration::from_secs(2)),
        keep_alive: keep_alive_ms.map(Duration::from_millis),
        wait: Some(Duration::from_secs(2)),
    }
}

fn wait_for(rx: &mpsc::Receiver<Report>) -> Report {
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn exchange_round_trips_and_connection_is_reused() {
    let (addr, accepted) = echo_server();
    let scheduler = scheduler(4);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();

    scheduler.request(target, timeouts(Some(2_000)), LineExchange::boxed("first\n", &tx));
    let (peer, outcome, response) = wait_for(&rx);
    assert_eq!(peer, addr);
    assert_eq!(outcome, Outcome::success());
    assert_eq!(response, b"first\n");
    assert_eq!(scheduler.idle_sessions(target), 1);

    scheduler.request(target, timeouts(Some(2_000)), LineExchange::boxed("second\n", &tx));
    let (_, outcome, response) = wait_for(&rx);
    assert_eq!(outcome, Outcome::success());
    assert_eq!(response, b"second\n");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.live_sessions(target), 1);
}

#[test]
fn without_keep_alive_the_connection_closes_after_one_exchange() {
    let (addr, _) = echo_server();
    let scheduler = scheduler(4);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();

    scheduler.request(target, timeouts(None), LineExchange::boxed("once\n", &tx));
    let (_, outcome, _) = wait_for(&rx);
    assert_eq!(outcome, Outcome::success());
    assert_eq!(scheduler.live_sessions(target), 0);
    assert_eq!(scheduler.idle_sessions(target), 0);
}

#[test]
fn refused_connection_is_a_system_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let scheduler = scheduler(4);
    let (tx, rx) = mpsc::channel();

    scheduler.request(CommTarget::tcp(addr), timeouts(None), LineExchange::boxed("x\n", &tx));
    let (_, outcome, _) = wait_for(&rx);
    assert_eq!(outcome.state, TaskState::SysError);
    assert_ne!(outcome.error, 0);
    assert_eq!(outcome.timeout_reason, TimeoutReason::NotTimeout);
    assert_eq!(scheduler.live_sessions(CommTarget::tcp(addr)), 0);
}

#[test]
fn silent_peer_times_out_while_transmitting() {
    let addr = silent_server();
    let scheduler = scheduler(4);
    let (tx, rx) = mpsc::channel();
    let limits = SessionTimeouts {
        response: Some(Duration::from_millis(100)),
        ..timeouts(None)
    };

    scheduler.request(CommTarget::tcp(addr), limits, LineExchange::boxed("hello\n", &tx));
    let (_, outcome, _) = wait_for(&rx);
    assert_eq!(outcome.state, TaskState::SysError);
    assert_eq!(outcome.error, ETIMEDOUT);
    assert_eq!(outcome.timeout_reason, TimeoutReason::Transmit);
}

#[test]
fn expired_connect_deadline_is_a_connect_timeout() {
    let addr = silent_server();
    let scheduler = scheduler(4);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();
    let limits = SessionTimeouts {
        connect: Some(Duration::ZERO),
        ..timeouts(None)
    };

    scheduler.request(target, limits, LineExchange::boxed("hello\n", &tx));
    let (peer, outcome, _) = wait_for(&rx);
    assert_eq!(peer, addr);
    assert_eq!(outcome.state, TaskState::SysError);
    assert_eq!(outcome.error, ETIMEDOUT);
    assert_eq!(outcome.timeout_reason, TimeoutReason::Connect);
    assert_eq!(scheduler.live_sessions(target), 0);
}

#[test]
fn unrepresentable_limits_mean_no_limit() {
    let (addr, _) = echo_server();
    let scheduler = scheduler(1);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();
    let limits = SessionTimeouts {
        connect: Some(Duration::MAX),
        send: Some(Duration::MAX),
        receive: Some(Duration::MAX),
        response: Some(Duration::MAX),
        keep_alive: Some(Duration::MAX),
        wait: Some(Duration::MAX),
    };

    scheduler.request(target, limits, LineExchange::boxed("first\n", &tx));
    scheduler.request(target, limits, LineExchange::boxed("second\n", &tx));
    for _ in 0..2 {
        let (_, outcome, _) = wait_for(&rx);
        assert_eq!(outcome, Outcome::success());
    }
    assert_eq!(scheduler.idle_sessions(target), 1);
}

#[test]
fn request_over_the_connection_limit_times_out_waiting() {
    let addr = silent_server();
    let scheduler = scheduler(1);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();

    let busy = SessionTimeouts {
        response: Some(Duration::from_millis(600)),
        ..timeouts(None)
    };
    scheduler.request(target, busy, LineExchange::boxed("first\n", &tx));

    let queued = SessionTimeouts {
        wait: Some(Duration::from_millis(50)),
        ..timeouts(None)
    };
    scheduler.request(target, queued, LineExchange::boxed("second\n", &tx));

    let (_, outcome, response) = wait_for(&rx);
    assert_eq!(outcome.timeout_reason, TimeoutReason::Wait);
    assert!(response.is_empty());

    let (_, outcome, _) = wait_for(&rx);
    assert_eq!(outcome.timeout_reason, TimeoutReason::Transmit);
}

#[test]
fn queued_request_gets_the_released_slot() {
    let (addr, _) = echo_server();
    let scheduler = scheduler(1);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();

    scheduler.request(target, timeouts(None), LineExchange::boxed("a\n", &tx));
    scheduler.request(target, timeouts(None), LineExchange::boxed("b\n", &tx));

    let mut responses: Vec<Vec<u8>> = (0..2)
        .map(|_| {
            let (_, outcome, response) = wait_for(&rx);
            assert_eq!(outcome, Outcome::success());
            response
        })
        .collect();
    responses.sort();
    assert_eq!(responses, vec![b"a\n".to_vec(), b"b\n".to_vec()]);
}

#[test]
fn idle_connection_is_evicted_after_keep_alive() {
    let (addr, _) = echo_server();
    let scheduler = scheduler(4);
    let target = CommTarget::tcp(addr);
    let (tx, rx) = mpsc::channel();

    scheduler.request(target, timeouts(Some(50)), LineExchange::boxed("ping\n", &tx));
    let (_, outcome, _) = wait_for(&rx);
    assert_eq!(outcome, Outcome::success());
    assert_eq!(scheduler.idle_sessions(target), 1);

    let mut live = usize::MAX;
    for _ in 0..50 {
        thread::sleep(Duration::from_millis(20));
        live = scheduler.live_sessions(target);
        if live == 0 {
            break;
        }
    }
    assert_eq!(live, 0);
    assert_eq!(scheduler.idle_sessions(target), 0);
}

#[test]
fn requests_after_shutdown_fail_fast() {
    let (addr, _) = echo_server();
    let scheduler = scheduler(4);
    scheduler.shutdown();
    let (tx, rx) = mpsc::channel();

    scheduler.request(CommTarget::tcp(addr), timeouts(None), LineExchange::boxed("x\n", &tx));
    let (_, outcome, _) = wait_for(&rx);
    assert_eq!(outcome.state, TaskState::TaskError);
    assert_eq!(outcome.error, crate::errors::TaskErrorCode::RuntimeShutDown.code());
}
