// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Flat memoization arena for the dynamic program.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::cost::DpCost;

/// A sub-rectangle of a container's grid, inclusive on both ends.
/// `x` ranges over columns and `y` over rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: usize,
    pub x2: usize,
    pub y1: usize,
    pub y2: usize,
}

impl Rect {
    #[inline]
    pub fn new(x1: usize, x2: usize, y1: usize, y2: usize) -> Rect {
        Rect { x1, x2, y1, y2 }
    }

    #[inline]
    pub fn is_cell(&self) -> bool {
        self.x1 == self.x2 && self.y1 == self.y2
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}..{}, {}..{})", self.x1, self.x2, self.y1, self.y2)
    }
}

const NOT_MEMOIZED: DpCost = DpCost {
    max: u64::MAX, sum: u64::MAX, icode: u64::MAX
};

/// `A[x1][x2][y1][y2][tiles][next_to_joiner]` stored in one
/// contiguous buffer.
#[derive(Debug, Clone)]
pub struct MemoTable {
    width: usize,
    height: usize,
    max_tiles: usize,
    table: Vec<DpCost>,
    hits: u64,
}

impl MemoTable {
    pub fn new(width: usize, height: usize, max_tiles: usize) -> MemoTable {
        assert!(width >= 1 && height >= 1 && max_tiles >= 1);
        let len = width * width * height * height * (max_tiles + 1) * 2;
        MemoTable {
            width, height, max_tiles,
            table: vec![NOT_MEMOIZED; len],
            hits: 0,
        }
    }

    #[inline]
    fn index(&self, r: Rect, tiles: usize, ntj: bool) -> usize {
        assert!(r.x1 <= r.x2 && r.x2 < self.width &&
                r.y1 <= r.y2 && r.y2 < self.height,
                "rect {} outside of {}x{} memo", r, self.width, self.height);
        assert!(tiles >= 1 && tiles <= self.max_tiles,
                "tile budget {} outside 1..={}", tiles, self.max_tiles);
        let mut i = r.x1;
        i = i * self.width + r.x2;
        i = i * self.height + r.y1;
        i = i * self.height + r.y2;
        i = i * (self.max_tiles + 1) + tiles;
        i * 2 + ntj as usize
    }

    /// Memoized value, counting the hit.
    #[inline]
    pub fn lookup(&mut self, r: Rect, tiles: usize, ntj: bool) -> Option<DpCost> {
        let v = self.table[self.index(r, tiles, ntj)];
        if v == NOT_MEMOIZED {
            None
        }
        else {
            self.hits += 1;
            Some(v)
        }
    }

    /// Memoized value, without touching statistics.
    #[inline]
    pub fn peek(&self, r: Rect, tiles: usize, ntj: bool) -> Option<DpCost> {
        let v = self.table[self.index(r, tiles, ntj)];
        (v != NOT_MEMOIZED).then_some(v)
    }

    #[inline]
    pub fn store(&mut self, r: Rect, tiles: usize, ntj: bool, cost: DpCost) {
        let i = self.index(r, tiles, ntj);
        self.table[i] = cost;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of memoized entries.
    pub fn filled(&self) -> usize {
        self.table.iter().filter(|&&v| v != NOT_MEMOIZED).count()
    }
}

/// Maps rectangles of structurally identical rows onto one canonical
/// rectangle so they share their memoized values.
#[derive(Debug, Clone, Default)]
pub struct MemoAlias {
    map: IndexMap<Rect, Rect>,
}

impl MemoAlias {
    pub fn insert(&mut self, from: Rect, to: Rect) {
        assert_eq!(from.x2 - from.x1, to.x2 - to.x1,
                   "aliased rectangles must have the same width");
        self.map.insert(from, to);
    }

    #[inline]
    pub fn canonical(&self, r: Rect) -> Rect {
        self.map.get(&r).copied().unwrap_or(r)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_lookup() {
        let mut m = MemoTable::new(3, 2, 4);
        let r = Rect::new(0, 2, 0, 1);
        assert_eq!(m.lookup(r, 4, false), None);
        assert_eq!(m.hits(), 0);
        m.store(r, 4, false, DpCost::single(0, 0));
        assert_eq!(m.lookup(r, 4, false), Some(DpCost::single(0, 0)));
        assert_eq!(m.lookup(r, 4, true), None);
        assert_eq!(m.lookup(Rect::new(0, 2, 0, 0), 4, false), None);
        assert_eq!(m.hits(), 1);
        assert_eq!(m.filled(), 1);
    }

    #[test]
    fn test_distinct_slots() {
        let mut m = MemoTable::new(2, 2, 2);
        let mut n = 0;
        for x1 in 0..2 {
            for x2 in x1..2 {
                for y1 in 0..2 {
                    for y2 in y1..2 {
                        for t in 1..=2 {
                            for j in [false, true] {
                                n += 1;
                                m.store(Rect::new(x1, x2, y1, y2), t, j,
                                        DpCost::single(n, 0));
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(m.filled(), n as usize);
        assert_eq!(m.peek(Rect::new(1, 1, 1, 1), 2, true),
                   Some(DpCost::single(n, 0)));
    }

    #[test]
    #[should_panic(expected = "tile budget")]
    fn test_zero_tiles() {
        let m = MemoTable::new(1, 1, 2);
        m.peek(Rect::new(0, 0, 0, 0), 0, false);
    }

    #[test]
    fn test_alias() {
        let mut a = MemoAlias::default();
        a.insert(Rect::new(1, 2, 0, 0), Rect::new(0, 1, 0, 0));
        assert_eq!(a.canonical(Rect::new(1, 2, 0, 0)), Rect::new(0, 1, 0, 0));
        assert_eq!(a.canonical(Rect::new(0, 2, 0, 0)), Rect::new(0, 2, 0, 0));
        assert_eq!(a.len(), 1);
    }
}
