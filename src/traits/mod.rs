// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod message;
pub mod resolver;

pub use message::{DecodeStatus, InboundMessage, OutboundMessage};
pub use resolver::{Resolver, SystemResolver};
