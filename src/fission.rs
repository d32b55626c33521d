// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Data-parallel replication of stateless filters.
//!
//! A fissable filter given `f` tiles is replicated `f` ways, each
//! replica doing `work / f` plus a fixed overhead. The cost formula
//! here is shared by the dynamic program and the traceback so that
//! both always agree.

use serde::{Deserialize, Serialize};
use crate::cost::DpCost;
use crate::options::PartitionOptions;
use crate::record::{PartitionEntry, Partitions};
use crate::rewrite::RewriteOp;
use crate::stream::{StreamGraph, StreamId};

/// Whether a filter can be replicated.
///
/// The filter must be stateless, consume and produce items in the
/// steady state, not consume anything in its init phase, and not sit
/// inside a feedback loop.
pub fn is_fissable(graph: &StreamGraph, id: StreamId) -> bool {
    let f = match graph.filter(id) {
        Some(f) => f,
        None => return false
    };
    !f.stateful &&
        f.rates.push > 0 &&
        f.rates.pop > 0 &&
        f.rates.init_pop == 0 &&
        !graph.has_feedback_ancestor(id)
}

/// Number of replicas a filter would get with `tiles` tiles.
/// One tile is kept for the joiner unless one is already adjacent.
#[inline]
pub fn fission_factor(options: &PartitionOptions, tiles: usize, next_to_joiner: bool) -> usize {
    let avail = if next_to_joiner { tiles } else { tiles - 1 };
    avail.min(options.max_fission_factor)
}

/// Work of one replica when fissed `ways` ways.
#[inline]
pub fn fissed_work(options: &PartitionOptions, work: u64, ways: usize) -> u64 {
    work / ways as u64 + options.fission_overhead
}

/// Cost of a filter given `tiles` tiles.
///
/// The instruction size is capped at the threshold so that one
/// oversized filter does not inflate the footprint reported by all
/// of its ancestors.
pub fn filter_cost(
    options: &PartitionOptions,
    work: u64, icode: u64, fissable: bool,
    tiles: usize, next_to_joiner: bool,
) -> DpCost {
    let tff = fission_factor(options, tiles, next_to_joiner);
    let icode = icode.min(options.icode_threshold);
    if tff > 1 && fissable {
        DpCost::single(fissed_work(options, work, tff), icode)
    }
    else {
        DpCost::single(work, icode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FissionSplitter {
    /// each replica takes `pop` items in turn.
    RoundRobin(Vec<u32>),
    /// every replica sees the whole input, needed when the filter
    /// peeks beyond what it pops.
    Duplicate,
}

/// How a filter is to be replicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FissionPlan {
    pub filter: StreamId,
    pub ways: usize,
    pub splitter: FissionSplitter,
    /// round-robin weights of the joiner collecting the replicas.
    pub joiner: Vec<u32>,
}

impl FissionPlan {
    pub fn new(graph: &StreamGraph, filter: StreamId, ways: usize) -> FissionPlan {
        assert!(ways > 1, "fission of {} into {} ways", graph.name(filter), ways);
        assert!(is_fissable(graph, filter),
                "fission of unfissable filter {}", graph.name(filter));
        let rates = match graph.filter(filter) {
            Some(f) => f.rates,
            None => unreachable!()
        };
        let splitter = if rates.peek == rates.pop {
            FissionSplitter::RoundRobin(vec![rates.pop; ways])
        }
        else {
            FissionSplitter::Duplicate
        };
        FissionPlan {
            filter, ways, splitter,
            joiner: vec![rates.push; ways],
        }
    }
}

/// Record the partitions of a filter leaf and decide whether
/// it is fissed.
#[allow(clippy::too_many_arguments)]
pub fn trace_filter(
    graph: &StreamGraph, options: &PartitionOptions,
    filter: StreamId, work: u64, fissable: bool,
    tiles: usize, next_to_joiner: bool,
    bottleneck: u64, partitions: &mut Partitions,
) -> RewriteOp {
    if options.pruning_on_traceback && work <= bottleneck {
        partitions.add(PartitionEntry::Filter(filter), work);
        return RewriteOp::Identity { stream: filter }
    }
    let tff = fission_factor(options, tiles, next_to_joiner);
    if tff > 1 && fissable {
        let w = fissed_work(options, work, tff);
        for index in 0..tff {
            if index != 0 {
                partitions.open();
            }
            partitions.add(PartitionEntry::Replica {
                filter, index, ways: tff
            }, w);
        }
        if options.joiners_need_tiles && !next_to_joiner {
            partitions.open();
            partitions.add(PartitionEntry::Joiner { filter }, 0);
        }
        clilog::trace!("fiss {} into {} ways of work {}", graph.name(filter), tff, w);
        RewriteOp::Fiss(FissionPlan::new(graph, filter, tff))
    }
    else {
        partitions.add(PartitionEntry::Filter(filter), work);
        RewriteOp::Identity { stream: filter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Filter, Joiner, Rates, Splitter};

    #[test]
    fn test_fissable_rules() {
        let mut g = StreamGraph::new();
        let ok = g.add_filter("ok", Filter::new(10));
        let st = g.add_filter("st", Filter::new(10).stateful());
        let sink = g.add_filter("sink", Filter::new(10).with_rates(Rates {
            push: 0, ..Default::default()
        }));
        let init = g.add_filter("init", Filter::new(10).with_rates(Rates {
            init_pop: 2, ..Default::default()
        }));
        let body = g.add_filter("body", Filter::new(10));
        let lb = g.add_filter("lb", Filter::new(10));
        let fl = g.add_feedback_loop("fl", Joiner::RoundRobin(vec![1, 1]),
                                     Splitter::Duplicate, body, lb);
        let top = g.add_pipeline("top", vec![ok, st, sink, init, fl]);
        g.set_root(top);
        assert!(is_fissable(&g, ok));
        assert!(!is_fissable(&g, st));
        assert!(!is_fissable(&g, sink));
        assert!(!is_fissable(&g, init));
        assert!(!is_fissable(&g, body));
        assert!(!is_fissable(&g, top));
    }

    #[test]
    fn test_factor_and_cost() {
        let o = PartitionOptions::default();
        assert_eq!(fission_factor(&o, 1, false), 0);
        assert_eq!(fission_factor(&o, 2, false), 1);
        assert_eq!(fission_factor(&o, 2, true), 2);
        assert_eq!(fission_factor(&o, 10, true), 3);
        assert_eq!(filter_cost(&o, 100, 0, true, 2, true).max, 51);
        assert_eq!(filter_cost(&o, 100, 0, true, 3, false).max, 51);
        assert_eq!(filter_cost(&o, 100, 0, true, 10, true).max, 34);
        assert_eq!(filter_cost(&o, 100, 0, false, 10, true).max, 100);
        assert_eq!(filter_cost(&o, 100, 20000, false, 1, true).icode, o.icode_threshold);
    }

    #[test]
    fn test_plan() {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(10).with_rates(Rates {
            peek: 2, pop: 2, push: 3, ..Default::default()
        }));
        let b = g.add_filter("b", Filter::new(10).with_rates(Rates {
            peek: 4, pop: 1, push: 1, ..Default::default()
        }));
        let top = g.add_pipeline("top", vec![a, b]);
        g.set_root(top);
        let pa = FissionPlan::new(&g, a, 3);
        assert_eq!(pa.splitter, FissionSplitter::RoundRobin(vec![2, 2, 2]));
        assert_eq!(pa.joiner, vec![3, 3, 3]);
        let pb = FissionPlan::new(&g, b, 2);
        assert_eq!(pb.splitter, FissionSplitter::Duplicate);
    }

    #[test]
    fn test_trace_replicas() {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(90));
        g.set_root(a);
        let mut o = PartitionOptions::default();
        o.pruning_on_traceback = false;

        let mut parts = Partitions::new();
        let op = trace_filter(&g, &o, a, 90, true, 4, false, 31, &mut parts);
        assert!(matches!(op, RewriteOp::Fiss(FissionPlan { ways: 3, .. })));
        let recs = parts.into_records();
        // three replicas and the joiner.
        assert_eq!(recs.len(), 4);
        assert!(recs[..3].iter().all(|r| r.work() == 31));
        assert_eq!(recs[3].work(), 0);

        // below the bottleneck, pruning keeps the filter whole.
        o.pruning_on_traceback = true;
        let mut parts = Partitions::new();
        let op = trace_filter(&g, &o, a, 90, true, 4, false, 90, &mut parts);
        assert_eq!(op, RewriteOp::Identity { stream: a });
        assert_eq!(parts.into_records().len(), 1);
    }
}
