// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Protocol plug-in points for network tasks.
//!
//! The session scheduler never looks inside a message. It asks the request to
//! serialize itself once the connection is writable, and feeds every chunk it
//! reads to the response until the response reports [`DecodeStatus::Complete`].

use std::io;

/// Result of feeding bytes to an [`InboundMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// More bytes are needed.
    Incomplete,
    /// The message is whole; anything after it on the connection is ignored.
    Complete,
}

/// A request written to the peer.
pub trait OutboundMessage: Send + 'static {
    /// Append the wire form of the message to `buf`.
    fn encode(&mut self, buf: &mut Vec<u8>) -> io::Result<()>;
}

/// A response read from the peer, built incrementally.
pub trait InboundMessage: Default + Send + 'static {
    fn append(&mut self, data: &[u8]) -> io::Result<DecodeStatus>;
}

/// Raw bytes, written as is.
impl OutboundMessage for Vec<u8> {
    fn encode(&mut self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.extend_from_slice(self);
        Ok(())
    }
}
