// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Work and instruction-size estimates for leaf filters.

use crate::stream::{StreamGraph, StreamId};

/// Supplies per-filter estimates to the partitioner.
///
/// Only ever queried with filter ids.
pub trait WorkOracle {
    /// Estimated work of one steady state of the filter.
    fn work(&self, graph: &StreamGraph, filter: StreamId) -> u64;

    /// Estimated instruction memory footprint of the filter.
    fn icode(&self, graph: &StreamGraph, filter: StreamId) -> u64;

    /// Steady-state repetitions of the filter.
    fn reps(&self, graph: &StreamGraph, filter: StreamId) -> u64 {
        graph.filter(filter).map(|f| f.reps).unwrap_or(1)
    }
}

/// Reads the estimates annotated on the filters themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotatedWork;

impl WorkOracle for AnnotatedWork {
    fn work(&self, graph: &StreamGraph, filter: StreamId) -> u64 {
        match graph.filter(filter) {
            Some(f) => f.work,
            None => panic!("work queried on non-filter {}", graph.name(filter))
        }
    }

    fn icode(&self, graph: &StreamGraph, filter: StreamId) -> u64 {
        match graph.filter(filter) {
            Some(f) => f.icode,
            None => panic!("icode queried on non-filter {}", graph.name(filter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Filter;

    #[test]
    fn test_annotated() {
        let mut g = StreamGraph::new();
        let mut f = Filter::new(42).with_icode(7);
        f.reps = 3;
        let a = g.add_filter("a", f);
        assert_eq!(AnnotatedWork.work(&g, a), 42);
        assert_eq!(AnnotatedWork.icode(&g, a), 7);
        assert_eq!(AnnotatedWork.reps(&g, a), 3);
    }
}
