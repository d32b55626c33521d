// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Dynamic programming partitioner.
//!
//! For every container, `get(rect, tiles, next_to_joiner)` is the
//! best cost of mapping the sub-rectangle `rect` of its grid onto
//! `tiles` tiles. It is obtained either by descending into a single
//! cell, by fusing the whole rectangle onto one tile, or by the best
//! vertical (column) or horizontal (row) cut with the tiles split
//! between both halves. All values are memoized per container.
//!
//! `next_to_joiner` tells whether the rectangle already has a joiner
//! tile downstream. When it does not and the last row is wider than
//! one column, one tile is set aside for the joiner.

use serde::{Deserialize, Serialize};
use crate::config::{Config, ConfigHierarchy, ContainerKind};
use crate::cost::{DpCost, INFEASIBLE};
use crate::fission::{filter_cost, is_fissable};
use crate::memo::Rect;
use crate::options::PartitionOptions;
use crate::oracle::{AnnotatedWork, WorkOracle};
use crate::record::{nth_largest_work, print_tile_work, PartitionRecord};
use crate::rewrite::{RewriteOp, SyncAction};
use crate::stream::{StreamGraph, StreamId, StreamKind};
use crate::sync::{MatchingSyncRemoval, SyncOracle};

/// Final outcome of a partitioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionResult {
    /// number of tiles the plan was computed for.
    pub tiles: usize,
    pub bottleneck: u64,
    pub partitions: Vec<PartitionRecord>,
    pub rewrite: RewriteOp,
}

/// One point of a scaling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPoint {
    pub tiles: usize,
    pub bottleneck: u64,
    pub partitions: usize,
}

pub struct DpPartitioner<'g> {
    pub(crate) graph: &'g StreamGraph,
    pub(crate) oracle: &'g dyn WorkOracle,
    pub(crate) sync: &'g dyn SyncOracle,
    pub(crate) options: PartitionOptions,
    pub(crate) configs: ConfigHierarchy,
    max_tiles: usize,
    /// bottleneck of the plan being traced, used for pruning.
    pub(crate) bottleneck: u64,
}

impl<'g> DpPartitioner<'g> {
    /// A partitioner using the annotated filter estimates and
    /// matching-weight sync removal.
    pub fn new(graph: &'g StreamGraph, options: PartitionOptions) -> DpPartitioner<'g> {
        DpPartitioner::with_collaborators(
            graph, &AnnotatedWork, &MatchingSyncRemoval, options)
    }

    pub fn with_collaborators(
        graph: &'g StreamGraph,
        oracle: &'g dyn WorkOracle,
        sync: &'g dyn SyncOracle,
        options: PartitionOptions,
    ) -> DpPartitioner<'g> {
        assert!(options.num_tiles >= 1, "cannot partition onto zero tiles");
        assert!(options.max_fission_factor >= 1, "max fission factor must be positive");
        let max_tiles = match options.strict {
            true => options.num_tiles,
            false => adaptive_bound(graph, &options),
        };
        clilog::info!("building configs for {} streams, up to {} tiles",
                      graph.len(), max_tiles);
        let configs = ConfigHierarchy::build(graph, oracle, &options, max_tiles);
        DpPartitioner {
            graph, oracle, sync, options, configs, max_tiles,
            bottleneck: 0,
        }
    }

    /// Largest tile budget the memo tables can answer.
    pub fn max_tiles(&self) -> usize {
        self.max_tiles
    }

    /// Memo hits and filled entries so far.
    pub fn memo_stats(&self) -> (u64, usize) {
        self.configs.memo_stats()
    }

    pub(crate) fn effective_ntj(&self, stream: StreamId, next_to_joiner: bool) -> bool {
        next_to_joiner || !self.options.joiners_need_tiles || match self.configs.get(stream) {
            Config::Container(c) => c.ends_in_null_joiner,
            Config::Filter(_) => false,
        }
    }

    /// Best cost of `stream` on `tiles` tiles.
    pub fn cost(&mut self, stream: StreamId, tiles: usize, next_to_joiner: bool) -> DpCost {
        assert!(tiles >= 1 && tiles <= self.max_tiles,
                "tile budget {} outside 1..={} for {}",
                tiles, self.max_tiles, self.graph.name(stream));
        let ntj = self.effective_ntj(stream, next_to_joiner);
        let cell = Rect::new(0, 0, 0, 0);
        match self.configs.get_mut(stream) {
            Config::Filter(fc) => {
                if let Some(v) = fc.memo.lookup(cell, tiles, ntj) {
                    return v
                }
                let v = filter_cost(
                    &self.options,
                    self.oracle.work(self.graph, stream),
                    self.oracle.icode(self.graph, stream),
                    fc.fissable, tiles, ntj);
                fc.memo.store(cell, tiles, ntj, v);
                v
            }
            Config::Container(c) => {
                let full = c.full_rect();
                self.get(stream, full, tiles, ntj)
            }
        }
    }

    /// Clamp the column range to the widest row of the rectangle.
    pub(crate) fn clamp(&self, cont: StreamId, r: Rect) -> Rect {
        let c = self.configs.container(cont);
        assert!(r.y1 <= r.y2 && r.y2 < c.height(),
                "row range {} outside of {} with {} rows",
                r, self.graph.name(cont), c.height());
        let mw = c.max_width(r.y1, r.y2);
        assert!(r.x1 <= r.x2 && r.x1 < mw,
                "column range {} outside of {} with width {}",
                r, self.graph.name(cont), mw);
        Rect { x2: r.x2.min(mw - 1), ..r }
    }

    #[inline]
    fn lookup(&mut self, cont: StreamId, r: Rect, tiles: usize, ntj: bool) -> Option<DpCost> {
        let c = self.configs.container_mut(cont);
        let key = c.alias.canonical(r);
        c.memo.lookup(key, tiles, ntj)
    }

    #[inline]
    fn store(&mut self, cont: StreamId, r: Rect, tiles: usize, ntj: bool, v: DpCost) {
        let c = self.configs.container_mut(cont);
        let key = c.alias.canonical(r);
        c.memo.store(key, tiles, ntj, v);
    }

    /// Best cost of rectangle `r` of container `cont`.
    pub(crate) fn get(
        &mut self, cont: StreamId, r: Rect, tiles: usize, next_to_joiner: bool
    ) -> DpCost {
        let ntj = next_to_joiner || !self.options.joiners_need_tiles;
        let r = self.clamp(cont, r);
        if let Some(v) = self.lookup(cont, r, tiles, ntj) {
            return v
        }

        if r.is_cell() {
            let child = self.configs.container(cont).cell(r.x1, r.y1);
            let v = self.cost(child, tiles, ntj);
            self.store(cont, r, tiles, ntj, v);
            return v
        }

        if tiles == 1 {
            // one tile leaves no joiner to care about.
            let v = self.fused_cost(cont, r, ntj);
            self.store(cont, r, 1, false, v);
            self.store(cont, r, 1, true, v);
            return v
        }

        let needs_joiner = self.configs.container(cont).width[r.y2] > 1 && !ntj;
        let avail = if needs_joiner { tiles - 1 } else { tiles };
        if avail == 1 && r.y1 == r.y2 {
            let v = self.get(cont, r, 1, true);
            self.store(cont, r, tiles, ntj, v);
            return v
        }

        let mut best: Option<DpCost> = None;
        let mut consider = |cand: DpCost| {
            if best.map_or(true, |b| cand.better_than(&b)) {
                best = Some(cand);
            }
        };
        // a vertical cut creates a joiner here, so both halves are
        // next to it.
        if self.vertical_cut(cont, r, avail).is_some() {
            for xp in r.x1..r.x2 {
                for tp in 1..avail {
                    let a = self.get(cont, Rect { x2: xp, ..r }, tp, true);
                    let b = self.get(cont, Rect { x1: xp + 1, ..r }, avail - tp, true);
                    consider(a.parallel(b));
                }
            }
        }
        // the bottom half shares our joiner; the top needs its own.
        for yp in r.y1..r.y2 {
            for tp in 1..tiles {
                let a = self.get(cont, Rect { y2: yp, ..r }, tp, false);
                let b = self.get(cont, Rect { y1: yp + 1, ..r }, tiles - tp, ntj);
                consider(a.parallel(b));
            }
        }
        let v = match best {
            Some(v) => v,
            None => panic!("no cut of {} {} onto {} tiles",
                           self.graph.name(cont), r, tiles)
        };
        self.store(cont, r, tiles, ntj, v);
        v
    }

    /// Whether a vertical cut of `r` is possible with `avail` tiles
    /// left after the joiner, and whether it needs the rows merged.
    pub(crate) fn vertical_cut(&self, cont: StreamId, r: Rect, avail: usize) -> Option<SyncAction> {
        let c = self.configs.container(cont);
        if !(r.x1 < r.x2 && c.same_width(r.y1, r.y2) && avail > 1) {
            return None
        }
        let full_width = r.x1 == 0 && r.x2 == c.width[r.y1] - 1;
        if c.kind == ContainerKind::Pipeline && r.y1 < r.y2 && full_width {
            match self.sync.can_remove_sync(self.graph, cont, r.y1, r.y2) {
                true => Some(SyncAction::Remove),
                false => None
            }
        }
        else {
            Some(SyncAction::Keep)
        }
    }

    /// Whether fusing `r` onto one tile is forbidden.
    fn fusion_blocked(&self, cont: StreamId, r: Rect) -> bool {
        let c = self.configs.container(cont);
        let mut filters = Vec::new();
        for cell in c.cells(r) {
            self.graph.for_each_filter(cell, &mut |f| filters.push(f));
        }
        if filters.len() <= 1 {
            return false
        }
        let horizontal = r.x1 < r.x2;
        filters.iter().any(|&f| {
            (self.options.limit_icode &&
             self.oracle.icode(self.graph, f) > self.options.icode_threshold) ||
                (horizontal && self.options.no_horizontal_fuse.contains(&f))
        })
    }

    /// Row whose bottom edge splits a single-tile rectangle in two.
    pub(crate) fn fuse_pivot(&self, cont: StreamId, r: Rect) -> Option<usize> {
        let c = self.configs.container(cont);
        if r.x1 == r.x2 {
            Some((r.y1 + r.y2) / 2)
        }
        else if !c.same_width(r.y1, r.y2) {
            let mut p = r.y1;
            while c.width[p] == c.width[p + 1] {
                p += 1;
            }
            Some(p)
        }
        else {
            None
        }
    }

    /// Cost of putting all of `r` on a single tile.
    ///
    /// Single-column and ragged rectangles are summed as two row
    /// halves, rectangular ones column by column with the horizontal
    /// fusion overhead added on top.
    fn fused_cost(&mut self, cont: StreamId, r: Rect, ntj: bool) -> DpCost {
        let threshold = self.options.icode_threshold;
        if self.fusion_blocked(cont, r) {
            return DpCost::infeasible(threshold)
        }
        let mut v = match self.fuse_pivot(cont, r) {
            Some(p) => {
                assert!(p < r.y2, "bad fusion pivot {} in {} {}",
                        p, self.graph.name(cont), r);
                let top = self.get(cont, Rect { y2: p, ..r }, 1, ntj);
                let bottom = self.get(cont, Rect { y1: p + 1, ..r }, 1, ntj);
                top.serial(bottom)
            }
            None => {
                let mut v = DpCost::default();
                for x in r.x1..=r.x2 {
                    v = v.serial(self.get(cont, Rect { x1: x, x2: x, ..r }, 1, ntj));
                }
                v.with_overhead(self.horizontal_overhead(cont, r))
            }
        };
        if self.options.limit_icode && v.icode > threshold {
            v.max = INFEASIBLE;
            v.sum = INFEASIBLE;
        }
        v
    }

    /// Estimated cost of serializing the rates crossing a fused
    /// rectangle: the input of its top row and output of its bottom row.
    pub(crate) fn horizontal_overhead(&self, cont: StreamId, r: Rect) -> u64 {
        let c = self.configs.container(cont);
        let factor = self.options.horizontal_filter_overhead_factor;
        let mut overhead = 0u64;
        for (y, input) in [(r.y1, true), (r.y2, false)] {
            for x in r.x1..=r.x2 {
                let cell = c.cell(x, y);
                overhead += match self.graph.filter(cell) {
                    Some(f) => {
                        let rate = if input { f.rates.pop } else { f.rates.push };
                        rate as u64 * self.oracle.reps(self.graph, cell) * factor
                    }
                    None => self.options.horizontal_container_overhead
                };
            }
        }
        overhead
    }

    /// Tile count to use when exactly `num_tiles` are available.
    fn strict_tile_count(&mut self) -> usize {
        let n = self.options.num_tiles;
        if !self.options.limit_icode {
            return n
        }
        let root = self.graph.root();
        let threshold = self.options.icode_threshold;
        for t in 1..=n {
            let c = self.cost(root, t, false);
            clilog::debug!("{} tiles: bottleneck {}, icode {}", t, c.max, c.icode);
            if !c.is_infeasible() && c.icode <= threshold {
                return t
            }
        }
        clilog::warn!("no tile count up to {} fits the instruction memory of {}, \
                       using {} tiles", n, threshold, n);
        n
    }

    /// Tile count chosen by trying all counts up to the bound.
    fn adaptive_tile_count(&mut self) -> usize {
        let n = self.options.num_tiles;
        let max = self.max_tiles;
        clilog::info!("searching tile counts {}..={}", n, max);
        choose_tile_count((n..=max).map(|t| {
            let (partitions, _) = self.traceback(t);
            let load = nth_largest_work(&partitions, n);
            clilog::debug!("{} tiles: {} partitions, {}-th largest load {}",
                           t, partitions.len(), n, load);
            (t, load)
        }))
    }

    /// Compute the partitions and rewrite plan of the whole stream.
    pub fn partition(&mut self) -> PartitionResult {
        let timer = clilog::stimer!("dynamic programming partition");
        let root = self.graph.root();
        let tiles = match self.options.strict {
            true => self.strict_tile_count(),
            false => self.adaptive_tile_count(),
        };
        let (partitions, rewrite) = self.traceback(tiles);
        let bottleneck = self.bottleneck;
        if bottleneck >= INFEASIBLE {
            clilog::warn!("no feasible partition of {} onto {} tiles",
                          self.graph.name(root), tiles);
        }
        assert!(partitions.len() <= tiles,
                "assigned {} partitions, but only have {} tiles",
                partitions.len(), tiles);
        let (hits, filled) = self.memo_stats();
        clilog::debug!("memo: {} entries, {} hits", filled, hits);
        clilog::info!("bottleneck {} on {} tiles ({} partitions)",
                      bottleneck, tiles, partitions.len());
        print_tile_work(self.graph, &partitions, tiles);
        clilog::finish!(timer);
        PartitionResult { tiles, bottleneck, partitions, rewrite }
    }
}

/// Pick the tile count after which the `n`-th largest load stops
/// growing.
///
/// Walks `(tiles, load)` in order and keeps the first count with the
/// largest load seen so far, stopping as soon as the load drops.
/// This accepts the first plateau, not the global maximum.
pub fn choose_tile_count<I: IntoIterator<Item = (usize, u64)>>(loads: I) -> usize {
    let mut it = loads.into_iter();
    let (mut best_t, mut best_load) = it.next().expect("empty tile count range");
    for (t, load) in it {
        if load > best_load {
            best_t = t;
            best_load = load;
        }
        else if load < best_load {
            break
        }
    }
    best_t
}

/// Upper bound on the tile counts worth trying in adaptive mode.
fn adaptive_bound(graph: &StreamGraph, options: &PartitionOptions) -> usize {
    let n = options.num_tiles;
    let bound = match options.joiners_need_tiles {
        true => 2 * n,
        false => n + n.div_ceil(2),
    };
    let mut structural = 0usize;
    let jt = options.joiners_need_tiles as usize;
    for node in 0..graph.len() {
        let id = StreamId(node);
        structural += match graph.kind(id) {
            StreamKind::Filter(_) if is_fissable(graph, id) => {
                options.max_fission_factor + jt
            }
            StreamKind::Filter(_) => 1,
            StreamKind::SplitJoin(sj) if sj.children.len() > 1 && !sj.joiner.is_null() => jt,
            StreamKind::FeedbackLoop(_) => jt,
            _ => 0
        };
    }
    bound.min(structural).max(n)
}

/// Bottleneck and partition count for every tile count in `1..=max_tiles`.
pub fn scaling_statistics(
    graph: &StreamGraph,
    oracle: &dyn WorkOracle,
    sync: &dyn SyncOracle,
    options: &PartitionOptions,
    max_tiles: usize,
) -> Vec<ScalingPoint> {
    let timer = clilog::stimer!("scaling statistics");
    let ret = (1..=max_tiles).map(|t| {
        let options = PartitionOptions {
            num_tiles: t,
            strict: true,
            ..options.clone()
        };
        let mut dp = DpPartitioner::with_collaborators(graph, oracle, sync, options);
        let r = dp.partition();
        clilog::info!("scaling: {} tiles, bottleneck {}, {} partitions",
                      t, r.bottleneck, r.partitions.len());
        ScalingPoint {
            tiles: t,
            bottleneck: r.bottleneck,
            partitions: r.partitions.len(),
        }
    }).collect();
    clilog::finish!(timer);
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{max_work, PartitionEntry};
    use crate::stream::{Filter, Joiner, Splitter};
    use crate::synth::{random_stream, SynthParams};

    fn options(tiles: usize, joiners: bool) -> PartitionOptions {
        PartitionOptions {
            num_tiles: tiles,
            joiners_need_tiles: joiners,
            ..Default::default()
        }
    }

    fn pipeline_10_50_10() -> StreamGraph {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(10).stateful());
        let b = g.add_filter("b", Filter::new(50).stateful());
        let c = g.add_filter("c", Filter::new(10).stateful());
        let top = g.add_pipeline("top", vec![a, b, c]);
        g.set_root(top);
        g
    }

    #[test]
    fn test_pipeline_three_tiles() {
        let g = pipeline_10_50_10();
        let r = DpPartitioner::new(&g, options(3, false)).partition();
        assert_eq!(r.bottleneck, 50);
        assert_eq!(r.partitions.len(), 3);
        let works = r.partitions.iter().map(|p| p.work()).collect::<Vec<_>>();
        assert_eq!(works, vec![10, 50, 10]);
    }

    #[test]
    fn test_pipeline_one_tile() {
        let g = pipeline_10_50_10();
        let r = DpPartitioner::new(&g, options(1, false)).partition();
        assert_eq!(r.bottleneck, 70);
        assert_eq!(r.partitions.len(), 1);
        assert_eq!(r.partitions[0].len(), 3);
        assert_eq!(r.rewrite, RewriteOp::Fuse {
            container: g.root(), rect: Rect::new(0, 0, 0, 2)
        });
    }

    #[test]
    fn test_splitjoin_fission() {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(100));
        let b = g.add_filter("b", Filter::new(100));
        let sj = g.add_splitjoin("sj", Splitter::Duplicate,
                                 Joiner::RoundRobin(vec![1, 1]), vec![a, b]);
        g.set_root(sj);
        let mut o = options(4, false);
        o.max_fission_factor = 2;
        let r = DpPartitioner::new(&g, o).partition();
        assert_eq!(r.bottleneck, 51);
        assert_eq!(r.partitions.len(), 4);
        assert!(r.partitions.iter().all(|p| p.work() == 51));
        let mut log = crate::rewrite::RewriteLog::default();
        r.rewrite.apply(&g, &mut log);
        assert_eq!(r.rewrite.count_transforms(), (0, 2));
    }

    fn icode_pipeline() -> StreamGraph {
        let mut g = StreamGraph::new();
        let f1 = g.add_filter("f1", Filter::new(40).with_icode(100).stateful());
        let big = g.add_filter("big", Filter::new(10).with_icode(5000).stateful());
        let f3 = g.add_filter("f3", Filter::new(10).with_icode(100).stateful());
        let f4 = g.add_filter("f4", Filter::new(40).with_icode(100).stateful());
        let top = g.add_pipeline("top", vec![f1, big, f3, f4]);
        g.set_root(top);
        g
    }

    #[test]
    fn test_oversized_filter_isolated() {
        let g = icode_pipeline();
        let big = g.find("big").unwrap();
        let mut o = options(3, false);
        o.icode_threshold = 1000;
        o.limit_icode = true;
        let r = DpPartitioner::new(&g, o.clone()).partition();
        assert_eq!(r.tiles, 3);
        assert_eq!(r.bottleneck, 50);
        let alone = r.partitions.iter()
            .find(|p| p.entries.iter().any(|(e, _)| *e == PartitionEntry::Filter(big)))
            .unwrap();
        assert_eq!(alone.len(), 1);

        // without the limit, fusing it with f3 is cheaper.
        o.limit_icode = false;
        let r = DpPartitioner::new(&g, o).partition();
        assert_eq!(r.bottleneck, 40);
        let with_big = r.partitions.iter()
            .find(|p| p.entries.iter().any(|(e, _)| *e == PartitionEntry::Filter(big)))
            .unwrap();
        assert_eq!(with_big.len(), 2);
    }

    #[test]
    fn test_icode_search_stops_early() {
        // everything fits one tile's instruction memory.
        let g = pipeline_10_50_10();
        let mut o = options(4, false);
        o.limit_icode = true;
        let r = DpPartitioner::new(&g, o).partition();
        assert_eq!(r.tiles, 1);
        assert_eq!(r.bottleneck, 70);
        assert_eq!(r.partitions.len(), 1);
    }

    #[test]
    fn test_icode_search_falls_back() {
        // any two of these overflow a tile, and two tiles are not
        // enough for three filters.
        let mut g = StreamGraph::new();
        let fs = (0..3).map(|i| {
            g.add_filter(&format!("f{}", i), Filter::new(10).with_icode(800).stateful())
        }).collect::<Vec<_>>();
        let top = g.add_pipeline("top", fs);
        g.set_root(top);
        let mut o = options(2, false);
        o.limit_icode = true;
        o.icode_threshold = 1000;
        let r = DpPartitioner::new(&g, o).partition();
        assert_eq!(r.tiles, 2);
        assert_eq!(r.bottleneck, INFEASIBLE);
        assert_eq!(r.partitions.len(), 2);

        // a third tile separates them.
        let mut o = options(3, false);
        o.limit_icode = true;
        o.icode_threshold = 1000;
        let r = DpPartitioner::new(&g, o).partition();
        assert_eq!(r.tiles, 3);
        assert_eq!(r.bottleneck, 10);
    }

    #[test]
    fn test_no_horizontal_fuse() {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(10).stateful());
        let b = g.add_filter("b", Filter::new(10).stateful());
        let sj = g.add_splitjoin("sj", Splitter::Duplicate,
                                 Joiner::RoundRobin(vec![1, 1]), vec![a, b]);
        g.set_root(sj);
        let mut o = options(1, false);
        o.no_horizontal_fuse.insert(a);
        let mut dp = DpPartitioner::new(&g, o);
        assert!(dp.cost(sj, 1, false).is_infeasible());

        let mut dp = DpPartitioner::new(&g, options(1, false));
        assert_eq!(dp.cost(sj, 1, false).max, 20);
    }

    #[test]
    fn test_joiner_takes_tile() {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(30).stateful());
        let b = g.add_filter("b", Filter::new(20).stateful());
        let sj = g.add_splitjoin("sj", Splitter::Duplicate,
                                 Joiner::RoundRobin(vec![1, 1]), vec![a, b]);
        g.set_root(sj);
        // the joiner eats one of two tiles: everything is fused.
        let mut dp = DpPartitioner::new(&g, options(3, true));
        assert_eq!(dp.cost(sj, 2, false).max, 50);
        assert_eq!(dp.cost(sj, 3, false).max, 30);
        // a null joiner needs no tile.
        let mut g2 = StreamGraph::new();
        let a = g2.add_filter("a", Filter::new(30).stateful());
        let b = g2.add_filter("b", Filter::new(20).stateful());
        let sj2 = g2.add_splitjoin("sj", Splitter::Duplicate, Joiner::Null, vec![a, b]);
        let top = g2.add_pipeline("top", vec![sj2]);
        g2.set_root(top);
        let mut dp = DpPartitioner::new(&g2, options(2, true));
        assert_eq!(dp.cost(top, 2, false).max, 30);
    }

    #[test]
    fn test_vertical_cut_needs_sync_removal() {
        // two split-joins in a row; with a duplicate splitter below,
        // columns cannot be separated across both rows.
        let build = |matching: bool| {
            let mut g = StreamGraph::new();
            let fs = (0..4).map(|i| g.add_filter(&format!("f{}", i),
                                                 Filter::new(10).stateful()))
                .collect::<Vec<_>>();
            let s1 = g.add_splitjoin("s1", Splitter::Duplicate,
                                     Joiner::RoundRobin(vec![1, 1]), fs[0..2].to_vec());
            let s2 = g.add_splitjoin("s2", match matching {
                true => Splitter::RoundRobin(vec![1, 1]),
                false => Splitter::Duplicate,
            }, Joiner::RoundRobin(vec![1, 1]), fs[2..4].to_vec());
            let top = g.add_pipeline("top", vec![s1, s2]);
            g.set_root(top);
            g
        };
        let g = build(true);
        let r = DpPartitioner::new(&g, options(2, false)).partition();
        assert_eq!(r.bottleneck, 20);
        assert!(matches!(r.rewrite, RewriteOp::VerticalCut { sync: SyncAction::Remove, .. }));

        let g = build(false);
        let r = DpPartitioner::new(&g, options(2, false)).partition();
        assert_eq!(r.bottleneck, 20);
        assert!(matches!(r.rewrite, RewriteOp::HorizontalCut { .. }));
    }

    #[test]
    fn test_uniform_rows_share_memo() {
        let mut g = StreamGraph::new();
        let fs = (0..4).map(|i| g.add_filter(&format!("f{}", i),
                                             Filter::new(100).stateful()))
            .collect::<Vec<_>>();
        let sj = g.add_splitjoin("sj", Splitter::Duplicate,
                                 Joiner::RoundRobin(vec![1; 4]), fs);
        g.set_root(sj);
        let mut dp = DpPartitioner::new(&g, options(4, false));
        assert!(dp.configs.num_aliases() > 0);
        assert_eq!(dp.cost(sj, 4, false).max, 100);
        assert_eq!(dp.cost(sj, 2, false).max, 200);
        assert_eq!(dp.cost(sj, 3, false).max, 200);
        assert_eq!(dp.cost(sj, 1, false).max, 400);
        let r = dp.partition();
        assert_eq!(r.partitions.len(), 4);
        assert_eq!(max_work(&r.partitions), 100);
    }

    #[test]
    fn test_memo_idempotent() {
        let g = random_stream(7, &SynthParams::default());
        let mut dp = DpPartitioner::new(&g, options(6, true));
        let root = g.root();
        let first = dp.cost(root, 6, false);
        let (hits, filled) = dp.memo_stats();
        let second = dp.cost(root, 6, false);
        assert_eq!(first, second);
        assert_eq!(dp.memo_stats(), (hits + 1, filled));
    }

    #[test]
    fn test_monotone_and_single_tile() {
        for seed in 0..20 {
            let g = random_stream(seed, &SynthParams::default());
            let root = g.root();
            for joiners in [false, true] {
                let mut dp = DpPartitioner::new(&g, options(8, joiners));
                assert_eq!(dp.cost(root, 1, false).max, g.total_work(root),
                           "seed {}", seed);
                let mut prev = u64::MAX;
                for t in 1..=8 {
                    let c = dp.cost(root, t, false);
                    assert!(c.max <= prev, "seed {} tiles {}: {} > {}",
                            seed, t, c.max, prev);
                    prev = c.max;
                }
            }
        }
    }

    #[test]
    fn test_monotone_with_infeasible_budgets() {
        let params = SynthParams { max_depth: 4, ..Default::default() };
        for seed in 0..60 {
            let g = random_stream(seed, &params);
            let root = g.root();
            let mut o = options(6, true);
            for (i, f) in g.filters_under(root).into_iter().enumerate() {
                if i % 3 == 0 {
                    o.no_horizontal_fuse.insert(f);
                }
            }
            let mut dp = DpPartitioner::new(&g, o);
            let mut prev = dp.cost(root, 1, false);
            assert!(prev.max <= INFEASIBLE);
            for t in 2..=6 {
                let c = dp.cost(root, t, false);
                assert!(c.max <= prev.max, "seed {} tiles {}: {} > {}",
                        seed, t, c.max, prev.max);
                prev = c;
            }
        }
    }

    #[test]
    fn test_traceback_fidelity() {
        for seed in 0..20 {
            let g = random_stream(seed, &SynthParams::default());
            for pruning in [false, true] {
                for joiners in [false, true] {
                    for tiles in [1, 2, 3, 5, 8] {
                        let mut o = options(tiles, joiners);
                        o.pruning_on_traceback = pruning;
                        let r = DpPartitioner::new(&g, o).partition();
                        assert_eq!(max_work(&r.partitions), r.bottleneck,
                                   "seed {} tiles {} pruning {} joiners {}",
                                   seed, tiles, pruning, joiners);
                        assert!(r.partitions.len() <= tiles);
                        assert!(r.partitions.iter().all(|p| !p.is_empty()));
                    }
                }
            }
        }
    }

    #[test]
    fn test_fission_bound() {
        let mut g = StreamGraph::new();
        let a = g.add_filter("a", Filter::new(1000));
        let top = g.add_pipeline("top", vec![a]);
        g.set_root(top);
        for tiles in 1..=6 {
            let mut o = options(tiles, false);
            o.pruning_on_traceback = false;
            let r = DpPartitioner::new(&g, o).partition();
            let ways = tiles.min(3);
            assert_eq!(r.partitions.len(), ways);
            let expect = if ways > 1 { 1000 / ways as u64 + 1 } else { 1000 };
            assert!(r.partitions.iter().all(|p| p.work() == expect));
        }
    }

    #[test]
    fn test_choose_tile_count() {
        assert_eq!(choose_tile_count([(4, 10), (5, 20), (6, 20), (7, 15), (8, 30)]), 5);
        assert_eq!(choose_tile_count([(4, 10)]), 4);
        assert_eq!(choose_tile_count([(4, 10), (5, 11), (6, 12)]), 6);
        assert_eq!(choose_tile_count([(4, 10), (5, 9), (6, 30)]), 4);
    }

    #[test]
    fn test_adaptive() {
        let g = random_stream(3, &SynthParams::default());
        let mut o = options(4, true);
        o.strict = false;
        let mut dp = DpPartitioner::new(&g, o);
        assert!(dp.max_tiles() >= 4 && dp.max_tiles() <= 8);
        let r = dp.partition();
        assert!(r.tiles >= 4 && r.tiles <= dp.max_tiles());
        assert_eq!(max_work(&r.partitions), r.bottleneck);
    }

    #[test]
    fn test_scaling() {
        let g = pipeline_10_50_10();
        let pts = scaling_statistics(&g, &AnnotatedWork, &MatchingSyncRemoval,
                                     &options(1, false), 4);
        let b = pts.iter().map(|p| p.bottleneck).collect::<Vec<_>>();
        assert_eq!(b, vec![70, 60, 50, 50]);
        assert_eq!(pts[3].partitions, 3);
    }
}
