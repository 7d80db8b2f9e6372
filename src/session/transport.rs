// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use mio::net::{TcpStream, UdpSocket};
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use super::{CommTarget, TransportType};

pub(super) enum ConnectProgress {
    Pending,
    Connected,
    Failed(io::Error),
}

/// Non-blocking socket behind a session.
pub(super) enum Transport {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Transport {
    /// Start connecting. TCP completes asynchronously; UDP is connected at once.
    pub(super) fn open(target: CommTarget) -> io::Result<Self> {
        match target.transport {
            TransportType::Tcp => Ok(Transport::Tcp(TcpStream::connect(target.addr)?)),
            TransportType::Udp => {
                let local: SocketAddr = if target.addr.is_ipv4() {
                    SocketAddr::from(([0, 0, 0, 0], 0))
                } else {
                    SocketAddr::from(([0u16; 8], 0))
                };
                let socket = UdpSocket::bind(local)?;
                socket.connect(target.addr)?;
                Ok(Transport::Udp(socket))
            }
        }
    }

    pub(super) fn is_connected(&self) -> bool {
        matches!(self, Transport::Udp(_))
    }

    pub(super) fn source(&mut self) -> &mut dyn mio::event::Source {
        match self {
            Transport::Tcp(stream) => stream,
            Transport::Udp(socket) => socket,
        }
    }

    /// Outcome of a pending TCP connect after a writable event.
    pub(super) fn connect_progress(&mut self) -> ConnectProgress {
        let Transport::Tcp(stream) = self else {
            return ConnectProgress::Connected;
        };
        match stream.take_error() {
            Ok(Some(error)) | Err(error) => return ConnectProgress::Failed(error),
            Ok(None) => {}
        }
        match stream.peer_addr() {
            Ok(_) => ConnectProgress::Connected,
            Err(error) if error.kind() == io::ErrorKind::NotConnected => ConnectProgress::Pending,
            Err(error) => ConnectProgress::Failed(error),
        }
    }

    /// Whether a zero-length read means the peer is gone.
    pub(super) fn eof_on_empty_read(&self) -> bool {
        matches!(self, Transport::Tcp(_))
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            Transport::Udp(socket) => socket.recv(buf),
        }
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            Transport::Udp(socket) => socket.send(buf),
        }
    }
}
