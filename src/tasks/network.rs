// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use super::{relay, TaskInfo, TaskMeta};
use crate::engine::{finish, Callback, Finish, SeriesWork, SubTask};
use crate::errors::{errno_of, TaskErrorCode, TaskState, TimeoutReason};
use crate::runtime::RuntimeHandle;
use crate::session::{CommTarget, Exchange, Outcome, SessionTimeouts, TransportType};
use crate::traits::{DecodeStatus, InboundMessage, OutboundMessage};
use crate::upstream::{RouteKey, UpstreamCookie, UpstreamResult};

const NETWORK_QUEUE: &str = "network";

/// Where a network task sends its request.
///
/// When `host` names an upstream group the server is chosen from the group
/// and the port given here is ignored. The route components are handed to the
/// group's route and rehash functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
    transport: TransportType,
    path: String,
    query: String,
    fragment: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            transport: TransportType::Tcp,
            path: String::new(),
            query: String::new(),
            fragment: String::new(),
        }
    }

    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportType::Udp,
            ..Self::new(host, port)
        }
    }

    /// Parse `tcp://host:port/path?query#fragment` (or `udp://`). IPv6 hosts go
    /// in brackets.
    pub fn parse(uri: &str) -> Result<Self, TaskErrorCode> {
        let (scheme, rest) = uri.split_once("://").ok_or(TaskErrorCode::UriParseFailed)?;
        let transport = match scheme.to_ascii_lowercase().as_str() {
            "tcp" => TransportType::Tcp,
            "udp" => TransportType::Udp,
            _ => return Err(TaskErrorCode::UriSchemeInvalid),
        };

        let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (authority, path) = match rest.find('/') {
            Some(at) => rest.split_at(at),
            None => (rest, ""),
        };

        let (host, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, tail) = bracketed
                    .split_once(']')
                    .ok_or(TaskErrorCode::UriParseFailed)?;
                (host, tail.strip_prefix(':').unwrap_or(""))
            }
            None => authority.rsplit_once(':').unwrap_or((authority, "")),
        };
        if host.is_empty() {
            return Err(TaskErrorCode::UriParseFailed);
        }
        let port = port.parse().map_err(|_| TaskErrorCode::UriPortInvalid)?;

        Ok(Self {
            host: host.to_string(),
            port,
            transport,
            path: path.to_string(),
            query: query.to_string(),
            fragment: fragment.to_string(),
        })
    }

    pub fn with_route(mut self, path: &str, query: &str, fragment: &str) -> Self {
        self.path = path.to_string();
        self.query = query.to_string();
        self.fragment = fragment.to_string();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> TransportType {
        self.transport
    }

    fn route_key(&self) -> RouteKey<'_> {
        RouteKey {
            path: &self.path,
            query: &self.query,
            fragment: &self.fragment,
        }
    }
}

/// Client request/response over TCP or UDP.
///
/// The request is encoded once the connection is writable; response bytes
/// are appended to a fresh `Resp` until it reports a complete message. The
/// callback runs on the handler pool.
pub struct NetworkTask<Req, Resp> {
    meta: TaskMeta,
    runtime: RuntimeHandle,
    target: Result<Target, TaskErrorCode>,
    timeouts: SessionTimeouts,
    request: Req,
    response: Resp,
    peer: Option<SocketAddr>,
    timeout_reason: TimeoutReason,
    callback: Option<Callback<NetworkTask<Req, Resp>>>,
}

impl<Req, Resp> NetworkTask<Req, Resp>
where
    Req: OutboundMessage,
    Resp: InboundMessage,
{
    pub(crate) fn new(runtime: RuntimeHandle, target: Result<Target, TaskErrorCode>, request: Req) -> Self {
        let timeouts = SessionTimeouts::from_endpoint(&runtime.settings().endpoint);
        Self {
            meta: TaskMeta::default(),
            runtime,
            target,
            timeouts,
            request,
            response: Resp::default(),
            peer: None,
            timeout_reason: TimeoutReason::NotTimeout,
            callback: None,
        }
    }

    /// `None` when the target URI did not parse; the task then fails with the
    /// parse error once started.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref().ok()
    }

    pub fn request(&self) -> &Req {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Req {
        &mut self.request
    }

    pub fn response(&self) -> &Resp {
        &self.response
    }

    pub fn take_response(&mut self) -> Resp {
        std::mem::take(&mut self.response)
    }

    /// Address the exchange actually went to.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn timeout_reason(&self) -> TimeoutReason {
        self.timeout_reason
    }

    pub fn timeouts(&self) -> &SessionTimeouts {
        &self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: SessionTimeouts) {
        self.timeouts = timeouts;
    }

    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.connect = timeout;
    }

    pub fn set_send_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.send = timeout;
    }

    pub fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.receive = timeout;
    }

    pub fn set_response_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.response = timeout;
    }

    /// `None` closes the connection after this exchange.
    pub fn set_keep_alive(&mut self, timeout: Option<Duration>) {
        self.timeouts.keep_alive = timeout;
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut NetworkTask<Req, Resp>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Run the callback on the handler pool.
    fn deliver(task: Box<Self>, series: SeriesWork) {
        let runtime = task.runtime.clone();
        let handler = runtime.handler();
        let queue = handler.queue(NETWORK_QUEUE);
        relay(task, series, |job| handler.submit_to(&queue, job), finish);
    }

    fn fail(mut task: Box<Self>, series: SeriesWork, state: TaskState, error: i32) {
        task.meta.complete(state, error);
        Self::deliver(task, series);
    }

    /// Hand the task to the session scheduler once an address is known.
    fn send(task: Box<Self>, series: SeriesWork, addr: SocketAddr, route: Route) {
        let transport = match &task.target {
            Ok(target) => target.transport,
            Err(_) => TransportType::Tcp,
        };
        let comm = CommTarget { addr, transport };
        let timeouts = task.timeouts;
        let scheduler = task.runtime.scheduler().clone();
        scheduler.request(
            comm,
            timeouts,
            Box::new(NetworkExchange {
                task,
                series,
                route,
            }),
        );
    }
}

/// How the address of a dispatched task was obtained. Used to report the
/// outcome back to the upstream group and the DNS cache.
#[derive(Default)]
struct Route {
    cookie: Option<UpstreamCookie>,
    resolved: Option<(String, u16)>,
}

impl Route {
    fn report(&self, runtime: &RuntimeHandle, state: TaskState) {
        if state.is_success() {
            if let Some(cookie) = &self.cookie {
                runtime.upstreams().notify_available(cookie);
            }
            return;
        }
        if !state.is_recoverable() {
            return;
        }
        if let Some(cookie) = &self.cookie {
            runtime.upstreams().notify_unavailable(cookie);
        }
        if let Some((host, port)) = &self.resolved {
            runtime.dns_cache().invalidate_fast(host, *port);
        }
    }
}

struct NetworkExchange<Req, Resp> {
    task: Box<NetworkTask<Req, Resp>>,
    series: SeriesWork,
    route: Route,
}

impl<Req, Resp> Exchange for NetworkExchange<Req, Resp>
where
    Req: OutboundMessage,
    Resp: InboundMessage,
{
    fn encode(&mut self, buf: &mut Vec<u8>) -> io::Result<()> {
        self.task.request.encode(buf)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<DecodeStatus> {
        self.task.response.append(data)
    }

    fn finish(self: Box<Self>, peer: SocketAddr, outcome: Outcome) {
        let NetworkExchange {
            mut task,
            series,
            route,
        } = *self;
        task.peer = Some(peer);
        task.timeout_reason = outcome.timeout_reason;
        task.meta.complete(outcome.state, outcome.error);
        route.report(&task.runtime, outcome.state);
        NetworkTask::deliver(task, series);
    }
}

impl<Req, Resp> TaskInfo for NetworkTask<Req, Resp> {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl<Req, Resp> Finish for NetworkTask<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    const KIND: &'static str = "network";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl<Req, Resp> SubTask for NetworkTask<Req, Resp>
where
    Req: OutboundMessage,
    Resp: InboundMessage,
{
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let target = match &self.target {
            Ok(target) => target,
            Err(code) => {
                let code = code.code();
                return NetworkTask::fail(self, series, TaskState::TaskError, code);
            }
        };

        let mut host = target.host.clone();
        let mut port = target.port;
        let mut ttl = self.runtime.settings().dns_ttl();
        let mut route = Route::default();

        let upstreams = self.runtime.upstreams();
        if upstreams.contains_group(&host) {
            match upstreams.choose(&host, &target.route_key()) {
                UpstreamResult::Found(selection) => {
                    host = selection.host;
                    port = selection.port.unwrap_or(target.port);
                    ttl = selection.params.dns_ttl;
                    route.cookie = Some(selection.cookie);
                }
                UpstreamResult::AllDown | UpstreamResult::NotFound => {
                    let code = TaskErrorCode::UpstreamUnavailable.code();
                    return NetworkTask::fail(self, series, TaskState::TaskError, code);
                }
            }
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return NetworkTask::send(self, series, SocketAddr::new(ip, port), route);
        }

        route.resolved = Some((host.clone(), port));
        let dns = self.runtime.dns().clone();
        dns.resolve(&host, port, ttl, move |resolution| match resolution {
            Ok(addresses) => match addresses.first() {
                Some(addr) => NetworkTask::send(self, series, *addr, route),
                None => {
                    route.report(&self.runtime, TaskState::DnsError);
                    NetworkTask::fail(self, series, TaskState::DnsError, 0);
                }
            },
            Err(error) => {
                route.report(&self.runtime, TaskState::DnsError);
                NetworkTask::fail(self, series, TaskState::DnsError, errno_of(&error));
            }
        });
    }
}
