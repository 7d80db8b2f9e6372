// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::net::SocketAddr;

use super::{hand_off, TaskInfo, TaskMeta};
use crate::engine::{Callback, Finish, SeriesWork, SubTask};
use crate::errors::{errno_of, TaskState};
use crate::runtime::RuntimeHandle;

/// Name resolution on the DNS pool.
///
/// Always asks the resolver; the runtime's DNS cache is neither consulted nor
/// updated. Failure leaves the task in [`TaskState::DnsError`].
pub struct DnsTask {
    meta: TaskMeta,
    runtime: RuntimeHandle,
    host: String,
    port: u16,
    addresses: Vec<SocketAddr>,
    callback: Option<Callback<DnsTask>>,
}

impl DnsTask {
    pub(crate) fn new(runtime: RuntimeHandle, host: &str, port: u16) -> Self {
        Self {
            meta: TaskMeta::default(),
            runtime,
            host: host.to_string(),
            port,
            addresses: Vec::new(),
            callback: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    pub fn take_addresses(&mut self) -> Vec<SocketAddr> {
        std::mem::take(&mut self.addresses)
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut DnsTask) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }
}

impl TaskInfo for DnsTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl Finish for DnsTask {
    const KIND: &'static str = "dns";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for DnsTask {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let dns = self.runtime.dns().clone();
        let lookup = dns.clone();
        hand_off(
            self,
            series,
            |job| dns.submit(job),
            move |task: &mut DnsTask| match lookup.resolve_uncached(&task.host, task.port) {
                Ok(addresses) => {
                    task.addresses = addresses;
                    task.meta.complete(TaskState::Success, 0);
                }
                Err(error) => task.meta.complete(TaskState::DnsError, errno_of(&error)),
            },
        );
    }
}
