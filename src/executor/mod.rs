// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Named-queue thread pool.
//!
//! Every queue name owns an independent FIFO of jobs; all queues share the same
//! worker threads. Each submission enqueues the job on its queue and posts the
//! queue itself onto the shared ready channel, so a worker that receives a queue
//! runs that queue's oldest job. Jobs of one queue therefore *start* in
//! submission order, while jobs of different queues interleave in arrival order.
//!
//! A job runs to completion on its worker before the worker picks up anything
//! else, so long-running jobs reduce the parallelism available to everybody.
//!
//! # Example
//! ```rust
//! use std::sync::mpsc;
//! use workloom::executor::Executor;
//!
//! let executor = Executor::new("compute", 2).unwrap();
//! let (tx, rx) = mpsc::channel();
//! executor.submit("sum", move || tx.send(2 + 2).unwrap()).unwrap();
//! assert_eq!(rx.recv().unwrap(), 4);
//! executor.shutdown();
//! ```

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::errors::RuntimeError;
use crate::observability::messages::runtime::{JobPanicked, ThreadPoolStarted};
use crate::observability::messages::StructuredLog;

/// Unit of work run on a pool thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Thread count used when CPU parallelism cannot be detected.
const FALLBACK_THREADS: usize = 4;

/// Resolve a configured thread count; non-positive means "one per available CPU".
pub fn resolve_thread_count(configured: i32) -> usize {
    if configured > 0 {
        return configured as usize;
    }
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_THREADS)
}

/// A named FIFO of pending jobs.
pub struct ExecQueue {
    name: String,
    jobs: Mutex<VecDeque<Job>>,
}

impl ExecQueue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs submitted but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl std::fmt::Debug for ExecQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecQueue")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Fixed-size worker pool fed by named queues.
pub struct Executor {
    pool: String,
    threads: usize,
    queues: DashMap<String, Arc<ExecQueue>>,
    ready: Mutex<Option<Sender<Arc<ExecQueue>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
}

impl Executor {
    /// Spawn `threads` workers (at least one).
    pub fn new(pool: &str, threads: usize) -> Result<Self, RuntimeError> {
        let threads = threads.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Arc<ExecQueue>>();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let name = format!("workloom-{}-{}", pool, index);
            let rx = rx.clone();
            let pool_name = pool.to_string();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&pool_name, rx))
                .map_err(|source| RuntimeError::Spawn { name, source })?;
            workers.push(handle);
        }
        let worker_ids = workers.iter().map(|h| h.thread().id()).collect();

        ThreadPoolStarted { pool, threads }.log();

        Ok(Self {
            pool: pool.to_string(),
            threads,
            queues: DashMap::new(),
            ready: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            worker_ids,
        })
    }

    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Get or create the queue registered under `name`.
    pub fn queue(&self, name: &str) -> Arc<ExecQueue> {
        if let Some(queue) = self.queues.get(name) {
            return Arc::clone(queue.value());
        }
        Arc::clone(
            self.queues
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ExecQueue::new(name)))
                .value(),
        )
    }

    /// Enqueue `job` on the queue called `queue`.
    pub fn submit<F>(&self, queue: &str, job: F) -> Result<(), RuntimeError>
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = self.queue(queue);
        self.submit_to(&queue, Box::new(job))
    }

    /// Enqueue an already boxed job on a queue obtained from [`Executor::queue`].
    pub fn submit_to(&self, queue: &Arc<ExecQueue>, job: Job) -> Result<(), RuntimeError> {
        let ready = self.ready.lock();
        let Some(sender) = ready.as_ref() else {
            return Err(RuntimeError::ShutDown);
        };
        queue.jobs.lock().push_back(job);
        sender
            .send(Arc::clone(queue))
            .map_err(|_| RuntimeError::ShutDown)
    }

    /// Whether the calling thread is one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_ids.contains(&current)
    }

    /// Stop accepting jobs, let workers drain what is already queued, and join them.
    ///
    /// Calling this from one of the pool's own workers only closes the pool; the
    /// workers exit on their own once the queue drains.
    pub fn shutdown(&self) {
        self.ready.lock().take();
        if self.is_worker_thread() {
            return;
        }
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("pool", &self.pool)
            .field("threads", &self.threads)
            .field("queues", &self.queues.len())
            .finish()
    }
}

fn worker_loop(pool: &str, ready: Receiver<Arc<ExecQueue>>) {
    for queue in ready.iter() {
        let job = queue.jobs.lock().pop_front();
        let Some(job) = job else { continue };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            let message = panic_message(payload.as_ref());
            JobPanicked {
                pool,
                queue: queue.name(),
                message: &message,
            }
            .log();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
