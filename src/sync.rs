// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Synchronization removal between pipeline rows.
//!
//! A vertical cut across several rows of a pipeline is only possible
//! when the joiner/splitter pairs between those rows can be removed,
//! merging the rows into one split-join.

use crate::stream::{Joiner, Splitter, StreamGraph, StreamId, StreamKind};

pub trait SyncOracle {
    /// Whether rows `y1..=y2` of `pipeline` can be merged into a
    /// single split-join by removing the synchronization between
    /// them.
    fn can_remove_sync(
        &self, graph: &StreamGraph,
        pipeline: StreamId, y1: usize, y2: usize
    ) -> bool;
}

/// Removes a joiner/splitter pair only when both are round-robin
/// with identical weights, so every column keeps its own data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingSyncRemoval;

impl SyncOracle for MatchingSyncRemoval {
    fn can_remove_sync(
        &self, graph: &StreamGraph,
        pipeline: StreamId, y1: usize, y2: usize
    ) -> bool {
        let rows = match graph.kind(pipeline) {
            StreamKind::Pipeline(rows) => rows,
            _ => panic!("sync removal queried on non-pipeline {}",
                        graph.name(pipeline))
        };
        assert!(y1 <= y2 && y2 < rows.len(),
                "row range {}..={} out of bounds in {}",
                y1, y2, graph.name(pipeline));
        let mut sjs = Vec::with_capacity(y2 - y1 + 1);
        for &r in &rows[y1..=y2] {
            match graph.kind(r) {
                StreamKind::SplitJoin(sj) => sjs.push(sj),
                _ => return false
            }
        }
        sjs.windows(2).all(|w| {
            match (&w[0].joiner, &w[1].splitter) {
                (Joiner::RoundRobin(jw), Splitter::RoundRobin(sw)) => {
                    jw.len() == sw.len() && jw == sw
                }
                _ => false
            }
        })
    }
}
