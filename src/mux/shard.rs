// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Action, EventHandler, HandleId, Ready};
use crate::errors::RuntimeError;
use crate::timer::deadline_after;
use crate::observability::messages::runtime::PollerFailed;
use crate::observability::messages::StructuredLog;

const WAKER_TOKEN: Token = Token(usize::MAX);
const EVENT_CAPACITY: usize = 256;

pub(super) enum Command {
    Register {
        handle: HandleId,
        handler: Box<dyn EventHandler>,
        interest: Interest,
        timeout: Option<Duration>,
    },
    Modify {
        handle: HandleId,
        interest: Interest,
        timeout: Option<Duration>,
    },
    Unregister {
        handle: HandleId,
    },
    Shutdown,
}

pub(super) struct ShardHandle {
    sender: Mutex<Option<Sender<Command>>>,
    waker: Arc<Waker>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ShardHandle {
    pub(super) fn spawn(index: usize) -> Result<Self, RuntimeError> {
        let poll = Poll::new().map_err(|source| RuntimeError::Poller { shard: index, source })?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)
            .map_err(|source| RuntimeError::Poller { shard: index, source })?;
        let (tx, rx) = crossbeam_channel::unbounded();

        let name = format!("workloom-poller-{}", index);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Shard::new(index, poll, rx).run())
            .map_err(|source| RuntimeError::Spawn { name, source })?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            waker: Arc::new(waker),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub(super) fn send(&self, command: Command) -> Result<(), RuntimeError> {
        {
            let sender = self.sender.lock();
            let Some(sender) = sender.as_ref() else {
                return Err(RuntimeError::ShutDown);
            };
            sender.send(command).map_err(|_| RuntimeError::ShutDown)?;
        }
        self.waker.wake().map_err(|_| RuntimeError::ShutDown)
    }

    pub(super) fn shutdown(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Command::Shutdown);
        }
        let _ = self.waker.wake();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

struct Entry {
    handler: Box<dyn EventHandler>,
    generation: u64,
}

struct Shard {
    index: usize,
    poll: Poll,
    commands: Receiver<Command>,
    entries: HashMap<HandleId, Entry>,
    // (deadline, handle, generation); stale generations are skipped when popped.
    deadlines: BinaryHeap<Reverse<(Instant, HandleId, u64)>>,
}

impl Shard {
    fn new(index: usize, poll: Poll, commands: Receiver<Command>) -> Self {
        Self {
            index,
            poll,
            commands,
            entries: HashMap::new(),
            deadlines: BinaryHeap::new(),
        }
    }

    fn run(mut self) {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        loop {
            let timeout = self.next_timeout();
            if let Err(error) = self.poll.poll(&mut events, timeout) {
                if error.kind() != io::ErrorKind::Interrupted {
                    PollerFailed {
                        shard: self.index,
                        error: &error,
                    }
                    .log();
                }
                continue;
            }

            let mut woken = false;
            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    woken = true;
                    continue;
                }
                let handle = HandleId(event.token().0 as u64);
                let ready = Ready::Io {
                    readable: event.is_readable(),
                    writable: event.is_writable(),
                    error: event.is_error(),
                    read_closed: event.is_read_closed(),
                    write_closed: event.is_write_closed(),
                };
                self.dispatch(handle, ready);
            }

            if woken && !self.drain_commands() {
                self.close_all();
                return;
            }
            self.expire_deadlines();
        }
    }

    fn next_timeout(&mut self) -> Option<Duration> {
        // Drop stale tops so a dead deadline never causes an early wakeup loop.
        while let Some(Reverse((_, handle, generation))) = self.deadlines.peek() {
            let live = self
                .entries
                .get(handle)
                .is_some_and(|entry| entry.generation == *generation);
            if live {
                break;
            }
            self.deadlines.pop();
        }
        self.deadlines
            .peek()
            .map(|Reverse((deadline, _, _))| deadline.saturating_duration_since(Instant::now()))
    }

    /// Apply queued commands. Returns `false` once the shard must stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Register {
                    handle,
                    mut handler,
                    interest,
                    timeout,
                }) => {
                    let token = Token(handle.as_u64() as usize);
                    if let Err(error) = self.poll.registry().register(handler.source(), token, interest)
                    {
                        handler.on_ready(Ready::RegisterFailed(error));
                        continue;
                    }
                    self.entries.insert(
                        handle,
                        Entry {
                            handler,
                            generation: 0,
                        },
                    );
                    self.arm(handle, timeout);
                }
                Ok(Command::Modify {
                    handle,
                    interest,
                    timeout,
                }) => self.modify(handle, interest, timeout),
                Ok(Command::Unregister { handle }) => {
                    if let Some(mut entry) = self.entries.remove(&handle) {
                        let _ = self.poll.registry().deregister(entry.handler.source());
                        entry.handler.on_removed();
                    }
                }
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        while let Some(Reverse((deadline, handle, generation))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            let live = self
                .entries
                .get(&handle)
                .is_some_and(|entry| entry.generation == generation);
            if live {
                self.dispatch(handle, Ready::Timeout);
            }
        }
    }

    fn dispatch(&mut self, handle: HandleId, ready: Ready) {
        let Some(entry) = self.entries.get_mut(&handle) else {
            return;
        };
        if matches!(ready, Ready::Timeout) {
            // Consumed: a Keep answer leaves the handle without a deadline.
            entry.generation += 1;
        }
        match entry.handler.on_ready(ready) {
            Action::Keep => {}
            Action::Modify { interest, timeout } => self.modify(handle, interest, timeout),
            Action::Remove => {
                if let Some(mut entry) = self.entries.remove(&handle) {
                    let _ = self.poll.registry().deregister(entry.handler.source());
                }
            }
        }
    }

    fn modify(&mut self, handle: HandleId, interest: Interest, timeout: Option<Duration>) {
        let registry: &Registry = self.poll.registry();
        let Some(entry) = self.entries.get_mut(&handle) else {
            return;
        };
        let token = Token(handle.as_u64() as usize);
        if let Err(error) = registry.reregister(entry.handler.source(), token, interest) {
            // The source is unusable; hand the failure to its owner and forget it.
            entry.handler.on_ready(Ready::RegisterFailed(error));
            if let Some(mut entry) = self.entries.remove(&handle) {
                let _ = self.poll.registry().deregister(entry.handler.source());
            }
            return;
        }
        entry.generation += 1;
        self.arm(handle, timeout);
    }

    fn arm(&mut self, handle: HandleId, timeout: Option<Duration>) {
        // A deadline past what `Instant` can hold is no deadline.
        let (Some(deadline), Some(entry)) = (timeout.and_then(deadline_after), self.entries.get(&handle)) else {
            return;
        };
        self.deadlines.push(Reverse((deadline, handle, entry.generation)));
    }

    fn close_all(&mut self) {
        for (_, mut entry) in self.entries.drain() {
            let _ = self.poll.registry().deregister(entry.handler.source());
            entry.handler.on_removed();
        }
        self.deadlines.clear();
    }
}
