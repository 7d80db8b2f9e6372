// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const VIRTUAL_NODES: u32 = 64;

/// Consistent-hash ring over a group's servers.
///
/// Each server owns [`VIRTUAL_NODES`] points. A key walks clockwise from its
/// hash to the first point whose server passes the caller's filter, so
/// excluding one server only moves the keys that landed on it.
#[derive(Debug, Default, Clone)]
pub(crate) struct HashRing {
    points: Vec<(u64, usize)>,
}

impl HashRing {
    pub(crate) fn build<'a>(addresses: impl Iterator<Item = &'a str>) -> Self {
        let mut points = Vec::new();
        for (index, address) in addresses.enumerate() {
            for replica in 0..VIRTUAL_NODES {
                points.push((hash_of(&(address, replica)), index));
            }
        }
        points.sort_unstable();
        Self { points }
    }

    /// Index of the first server at or after `key` that `accept` takes.
    pub(crate) fn locate(&self, key: u32, mut accept: impl FnMut(usize) -> bool) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let hash = hash_of(&key);
        let start = self.points.partition_point(|(point, _)| *point < hash);
        let len = self.points.len();
        (0..len)
            .map(|offset| self.points[(start + offset) % len].1)
            .find(|&index| accept(index))
    }
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
