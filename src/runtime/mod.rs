// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The runtime context.
//!
//! A [`Runtime`] owns every shared resource tasks run on: the compute, handler,
//! file I/O and DNS pools, the timer thread, the multiplexer shards, the
//! session scheduler, the DNS cache and the upstream registry. There is no
//! process-wide instance; create one explicitly (directly or through
//! [`RuntimeBuilder`](crate::config::RuntimeBuilder)) and obtain tasks from its
//! factory methods. Tasks hold a [`RuntimeHandle`], so they stay valid while
//! in flight even if the `Runtime` value is moved around.
//!
//! Dropping the `Runtime` (or calling [`RuntimeHandle::shutdown`]) stops accepting new
//! work: queued waiters and live sessions finish with
//! `TaskErrorCode::RuntimeShutDown`, jobs already queued on a pool still run, and
//! timers that have not fired are abandoned.
//!
//! # Example
//! ```rust
//! use workloom::config::Settings;
//! use workloom::engine::SubTaskExt;
//! use workloom::runtime::Runtime;
//! use workloom::tasks::TaskInfo;
//!
//! let runtime = Runtime::new(Settings::default()).unwrap();
//! let mut task = runtime.go_task("math", || {
//!     let _ = (1..=10).sum::<u32>();
//! });
//! task.set_callback(|task| assert!(task.state().is_success()));
//! task.start().completion().wait();
//! ```

#[cfg(test)]
mod integration_tests;

use std::fs::File;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::dns::{DnsCache, DnsService};
use crate::errors::RuntimeError;
use crate::executor::{resolve_thread_count, Executor};
use crate::mux::Multiplexer;
use crate::observability::messages::runtime::{RuntimeStarted, RuntimeStopped};
use crate::observability::messages::StructuredLog;
use crate::session::CommScheduler;
use crate::tasks::{
    merge_sorted, CounterRegistry, CounterTask, DnsTask, EmptyTask, FileIoTask, GoTask, MultiThreadTask, NetworkTask, Target,
    ThreadTask, TimerTask,
};
use crate::timer::TimerService;
use crate::traits::{InboundMessage, OutboundMessage, Resolver, SystemResolver};
use crate::upstream::UpstreamManager;

struct Inner {
    settings: Settings,
    compute: Arc<Executor>,
    handler: Arc<Executor>,
    file_io: Arc<Executor>,
    dns_pool: Arc<Executor>,
    timer: Arc<TimerService>,
    mux: Arc<Multiplexer>,
    scheduler: Arc<CommScheduler>,
    dns: Arc<DnsService>,
    upstreams: Arc<UpstreamManager>,
    counters: Arc<CounterRegistry>,
    started_at: Instant,
    stopped: AtomicBool,
}

/// Cheap, clonable access to a runtime's shared resources.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<Inner>,
}

impl RuntimeHandle {
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Pool for user computation (go and thread tasks).
    pub fn compute(&self) -> &Arc<Executor> {
        &self.inner.compute
    }

    /// Pool that runs completion callbacks of timer and network tasks.
    pub fn handler(&self) -> &Arc<Executor> {
        &self.inner.handler
    }

    pub fn file_io(&self) -> &Arc<Executor> {
        &self.inner.file_io
    }

    pub fn timer(&self) -> &Arc<TimerService> {
        &self.inner.timer
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.inner.mux
    }

    pub fn scheduler(&self) -> &Arc<CommScheduler> {
        &self.inner.scheduler
    }

    pub fn dns(&self) -> &Arc<DnsService> {
        &self.inner.dns
    }

    pub fn dns_cache(&self) -> &Arc<DnsCache> {
        self.inner.dns.cache()
    }

    pub fn upstreams(&self) -> &Arc<UpstreamManager> {
        &self.inner.upstreams
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn empty_task(&self) -> EmptyTask {
        EmptyTask::new()
    }

    /// Run `work` on the compute queue called `queue`.
    pub fn go_task<F>(&self, queue: &str, work: F) -> GoTask
    where
        F: FnOnce() + Send + 'static,
    {
        GoTask::new(self.clone(), self.compute().queue(queue), work)
    }

    /// Run `routine` over `input` on the compute queue called `queue`.
    pub fn thread_task<I, O, F>(&self, queue: &str, input: I, routine: F) -> ThreadTask<I, O>
    where
        I: Send + 'static,
        O: Default + Send + 'static,
        F: FnOnce(&I, &mut O) + Send + 'static,
    {
        ThreadTask::new(self.clone(), self.compute().queue(queue), input, routine)
    }

    /// Run `routine` once per input, each on its own job on the compute queue
    /// called `queue`.
    pub fn multi_thread_task<I, O, F>(&self, queue: &str, inputs: Vec<I>, routine: F) -> MultiThreadTask<O>
    where
        I: Send + 'static,
        O: Default + Send + 'static,
        F: Fn(&I, &mut O) + Send + Sync + 'static,
    {
        MultiThreadTask::new(self, queue, inputs, routine)
    }

    /// Sort `data` on the compute queue called `queue`. The sorted vector is
    /// the task's output.
    pub fn sort_task<T>(&self, queue: &str, data: Vec<T>) -> ThreadTask<(), Vec<T>>
    where
        T: Ord + Send + 'static,
    {
        self.thread_task(queue, (), move |_: &(), sorted: &mut Vec<T>| {
            let mut data = data;
            data.sort();
            *sorted = data;
        })
    }

    /// Merge two ascending vectors on the compute queue called `queue`.
    pub fn merge_task<T>(&self, queue: &str, left: Vec<T>, right: Vec<T>) -> ThreadTask<(), Vec<T>>
    where
        T: Ord + Send + 'static,
    {
        self.thread_task(queue, (), move |_: &(), merged: &mut Vec<T>| {
            *merged = merge_sorted(left, right);
        })
    }

    pub fn timer_task(&self, delay: Duration) -> TimerTask {
        TimerTask::new(self.clone(), delay)
    }

    /// A counter counted through its handle.
    pub fn counter_task(&self, target: u32) -> CounterTask {
        CounterTask::new(target)
    }

    /// A counter that can also be counted with [`RuntimeHandle::count_by_name`].
    pub fn named_counter_task(&self, name: &str, target: u32) -> CounterTask {
        CounterTask::named(Arc::clone(&self.inner.counters), name, target)
    }

    /// Deliver up to `n` counts to the counters named `name`, oldest first.
    /// Returns how many counts were delivered.
    pub fn count_by_name(&self, name: &str, n: usize) -> usize {
        self.inner.counters.count_by_name(name, n)
    }

    pub fn pread_task(&self, file: Arc<File>, offset: u64, len: usize) -> FileIoTask {
        FileIoTask::read(self.clone(), file, offset, len)
    }

    pub fn pwrite_task(&self, file: Arc<File>, offset: u64, data: Vec<u8>) -> FileIoTask {
        FileIoTask::write(self.clone(), file, offset, data)
    }

    /// Read into buffers of the given lengths, in order, starting at `offset`.
    pub fn preadv_task(&self, file: Arc<File>, offset: u64, lens: &[usize]) -> FileIoTask {
        FileIoTask::read_vectored(self.clone(), file, offset, lens)
    }

    /// Write `vectors` back to back starting at `offset`.
    pub fn pwritev_task(&self, file: Arc<File>, offset: u64, vectors: Vec<Vec<u8>>) -> FileIoTask {
        FileIoTask::write_vectored(self.clone(), file, offset, vectors)
    }

    /// Resolve `host:port` on the DNS pool without going through the cache.
    pub fn dns_task(&self, host: &str, port: u16) -> DnsTask {
        DnsTask::new(self.clone(), host, port)
    }

    pub fn network_task<Req, Resp>(&self, target: Target, request: Req) -> NetworkTask<Req, Resp>
    where
        Req: OutboundMessage,
        Resp: InboundMessage,
    {
        NetworkTask::new(self.clone(), Ok(target), request)
    }

    /// Like [`RuntimeHandle::network_task`] with a `tcp://` or `udp://` URI. A
    /// URI that does not parse yields a task that fails with the parse error.
    pub fn network_task_uri<Req, Resp>(&self, uri: &str, request: Req) -> NetworkTask<Req, Resp>
    where
        Req: OutboundMessage,
        Resp: InboundMessage,
    {
        NetworkTask::new(self.clone(), Target::parse(uri), request)
    }

    /// Stop every pool and thread. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = &self.inner;
        inner.scheduler.shutdown();
        inner.mux.shutdown();
        inner.timer.shutdown();
        inner.dns_pool.shutdown();
        inner.compute.shutdown();
        inner.file_io.shutdown();
        inner.handler.shutdown();
        RuntimeStopped {
            uptime: inner.started_at.elapsed(),
        }
        .log();
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("compute", &self.inner.compute)
            .field("handler", &self.inner.handler)
            .field("upstreams", &self.inner.upstreams)
            .field("stopped", &self.is_shut_down())
            .finish()
    }
}

/// Owner of a runtime. Shuts the runtime down when dropped.
#[derive(Debug)]
pub struct Runtime {
    handle: RuntimeHandle,
}

impl Runtime {
    /// Start a runtime that resolves names through the operating system.
    pub fn new(settings: Settings) -> Result<Self, RuntimeError> {
        Self::with_resolver(settings, Arc::new(SystemResolver))
    }

    pub fn with_resolver(settings: Settings, resolver: Arc<dyn Resolver>) -> Result<Self, RuntimeError> {
        let compute_threads = resolve_thread_count(settings.compute_threads);
        let compute = Arc::new(Executor::new("compute", compute_threads)?);
        let handler = Arc::new(Executor::new("handler", settings.handler_threads)?);
        let file_io = Arc::new(Executor::new("file", settings.file_io_threads)?);
        let dns_pool = Arc::new(Executor::new("dns", settings.dns_threads)?);
        let timer = Arc::new(TimerService::new()?);
        let mux = Arc::new(Multiplexer::new(settings.poller_threads)?);
        let scheduler = CommScheduler::new(
            Arc::clone(&mux),
            Arc::clone(&timer),
            settings.endpoint.max_connections,
        );
        let dns = Arc::new(DnsService::new(
            Arc::new(DnsCache::new()),
            resolver,
            Arc::clone(&dns_pool),
        ));
        let upstreams = Arc::new(UpstreamManager::new(settings.upstream_probation()));

        RuntimeStarted {
            poller_threads: mux.shard_count(),
            handler_threads: handler.thread_count(),
            compute_threads,
            dns_threads: dns_pool.thread_count(),
        }
        .log();

        Ok(Self {
            handle: RuntimeHandle {
                inner: Arc::new(Inner {
                    settings,
                    compute,
                    handler,
                    file_io,
                    dns_pool,
                    timer,
                    mux,
                    scheduler,
                    dns,
                    upstreams,
                    counters: Arc::new(CounterRegistry::default()),
                    started_at: Instant::now(),
                    stopped: AtomicBool::new(false),
                }),
            },
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }
}

impl Deref for Runtime {
    type Target = RuntimeHandle;

    fn deref(&self) -> &RuntimeHandle {
        &self.handle
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}
