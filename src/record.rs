// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Partition records: what ends up on each tile.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use crate::stream::{StreamGraph, StreamId};

/// One item placed on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionEntry {
    Filter(StreamId),
    /// replica `index` of a filter fissed `ways` ways.
    Replica { filter: StreamId, index: usize, ways: usize },
    /// the joiner collecting the replicas of a fissed filter.
    Joiner { filter: StreamId },
    /// serialization penalty of fusing a multi-column rectangle.
    FusionOverhead { container: StreamId },
}

impl PartitionEntry {
    pub fn describe(&self, graph: &StreamGraph) -> String {
        use PartitionEntry::*;
        match *self {
            Filter(f) => graph.name(f).to_string(),
            Replica { filter, index, ways } => {
                format!("{}[{}/{}]", graph.name(filter), index, ways)
            }
            Joiner { filter } => format!("{}.joiner", graph.name(filter)),
            FusionOverhead { container } => {
                format!("{}.fusion_overhead", graph.name(container))
            }
        }
    }
}

/// Everything assigned to one tile, with estimated work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub entries: Vec<(PartitionEntry, u64)>,
}

impl PartitionRecord {
    #[inline]
    pub fn work(&self) -> u64 {
        self.entries.iter().map(|(_, w)| *w).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Records being filled during traceback. New entries always go to
/// the most recently opened record.
#[derive(Debug, Clone)]
pub struct Partitions {
    records: Vec<PartitionRecord>,
}

impl Default for Partitions {
    fn default() -> Self {
        Partitions::new()
    }
}

impl Partitions {
    pub fn new() -> Partitions {
        Partitions { records: vec![PartitionRecord::default()] }
    }

    #[inline]
    pub fn add(&mut self, entry: PartitionEntry, work: u64) {
        // there is always an open record.
        let last = self.records.len() - 1;
        self.records[last].entries.push((entry, work));
    }

    /// Start a new tile.
    #[inline]
    pub fn open(&mut self) {
        self.records.push(PartitionRecord::default());
    }

    pub fn into_records(self) -> Vec<PartitionRecord> {
        self.records
    }
}

pub fn max_work(partitions: &[PartitionRecord]) -> u64 {
    partitions.iter().map(|p| p.work()).max().unwrap_or(0)
}

/// The `n`-th largest per-tile work (1-based), or 0 when there are
/// fewer than `n` records.
pub fn nth_largest_work(partitions: &[PartitionRecord], n: usize) -> u64 {
    assert!(n >= 1);
    partitions.iter().map(|p| p.work())
        .sorted_unstable_by(|a, b| b.cmp(a))
        .nth(n - 1)
        .unwrap_or(0)
}

/// Map from every placed item to its tile index.
pub fn tile_map(partitions: &[PartitionRecord]) -> IndexMap<PartitionEntry, usize> {
    let mut ret = IndexMap::new();
    for (i, p) in partitions.iter().enumerate() {
        for (e, _) in &p.entries {
            ret.insert(*e, i);
        }
    }
    ret
}

/// Log the work of every tile against the bottleneck.
pub fn print_tile_work(graph: &StreamGraph, partitions: &[PartitionRecord], num_tiles: usize) {
    let max = max_work(partitions);
    let total: u64 = partitions.iter().map(|p| p.work()).sum();
    for (i, p) in partitions.iter().enumerate() {
        let share = if max == 0 { 0. } else { p.work() as f64 / max as f64 * 100. };
        clilog::info!("tile {:>3}: work {:>10} ({:>5.1}% of bottleneck) {}",
                      i, p.work(), share,
                      p.entries.iter().map(|(e, _)| e.describe(graph)).join(", "));
    }
    let utilization = if max == 0 || num_tiles == 0 {
        0.
    }
    else {
        total as f64 / (max as f64 * num_tiles as f64) * 100.
    };
    clilog::info!("{} partitions on {} tiles, bottleneck {}, utilization {:.1}%",
                  partitions.len(), num_tiles, max, utilization);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(works: &[u64]) -> PartitionRecord {
        PartitionRecord {
            entries: works.iter().enumerate()
                .map(|(i, &w)| (PartitionEntry::Filter(StreamId(i)), w))
                .collect()
        }
    }

    #[test]
    fn test_partitions_open() {
        let mut p = Partitions::new();
        p.add(PartitionEntry::Filter(StreamId(0)), 5);
        p.add(PartitionEntry::Filter(StreamId(1)), 7);
        p.open();
        p.add(PartitionEntry::Joiner { filter: StreamId(1) }, 0);
        let recs = p.into_records();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].work(), 12);
        assert_eq!(recs[1].len(), 1);
    }

    #[test]
    fn test_nth_largest() {
        let ps = vec![rec(&[3]), rec(&[10, 2]), rec(&[7]), rec(&[1])];
        assert_eq!(max_work(&ps), 12);
        assert_eq!(nth_largest_work(&ps, 1), 12);
        assert_eq!(nth_largest_work(&ps, 2), 7);
        assert_eq!(nth_largest_work(&ps, 4), 1);
        assert_eq!(nth_largest_work(&ps, 5), 0);
    }

    #[test]
    fn test_tile_map() {
        let ps = vec![rec(&[3, 4]), rec(&[10])];
        let m = tile_map(&ps);
        // ids restart per record in this helper; the later tile wins.
        assert_eq!(m[&PartitionEntry::Filter(StreamId(0))], 1);
        assert_eq!(m[&PartitionEntry::Filter(StreamId(1))], 0);
    }
}
