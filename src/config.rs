// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! The config hierarchy.
//!
//! Every stream that the dynamic program can address gets one config:
//! the toplevel stream and every cell of every container grid.
//! A container config lays its children out as a grid of rows and
//! columns, and owns the memo table over all sub-rectangles of
//! that grid.
//!
//! Split-joins and feedback loops that appear as a row of a pipeline
//! do not get their own config: their children are the cells of that
//! row.

use crate::fission::is_fissable;
use crate::memo::{MemoAlias, MemoTable, Rect};
use crate::options::PartitionOptions;
use crate::oracle::WorkOracle;
use crate::stream::{StreamGraph, StreamId, StreamKind};

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub filter: StreamId,
    pub fissable: bool,
    /// collapses to `(tiles, next_to_joiner)`.
    pub memo: MemoTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Pipeline,
    SplitJoin,
    FeedbackLoop,
}

#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub stream: StreamId,
    pub kind: ContainerKind,
    /// `rows[y][x]` is the stream at column `x` of row `y`.
    pub rows: Vec<Vec<StreamId>>,
    pub width: Vec<usize>,
    max_width: Vec<usize>,
    same_width: Vec<bool>,
    /// a pipeline whose last row is a split-join with a null joiner
    /// never needs to reserve a joiner tile.
    pub ends_in_null_joiner: bool,
    pub memo: MemoTable,
    pub alias: MemoAlias,
}

impl ContainerConfig {
    fn new(
        graph: &StreamGraph, stream: StreamId,
        kind: ContainerKind, rows: Vec<Vec<StreamId>>,
        ends_in_null_joiner: bool, max_tiles: usize,
    ) -> ContainerConfig {
        let height = rows.len();
        assert!(height >= 1, "container {} has no rows", graph.name(stream));
        let width = rows.iter().map(|r| r.len()).collect::<Vec<_>>();
        assert!(width.iter().all(|&w| w >= 1),
                "container {} has an empty row", graph.name(stream));
        let mut max_width = vec![0; height * height];
        let mut same_width = vec![false; height * height];
        for y1 in 0..height {
            let mut max = width[y1];
            let mut same = true;
            for y2 in y1..height {
                max = max.max(width[y2]);
                same = same && width[y2] == width[y1];
                max_width[y1 * height + y2] = max;
                same_width[y1 * height + y2] = same;
            }
        }
        let maxw = width.iter().copied().max().unwrap_or(1);
        ContainerConfig {
            stream, kind, rows, width,
            max_width, same_width,
            ends_in_null_joiner,
            memo: MemoTable::new(maxw, height, max_tiles),
            alias: MemoAlias::default(),
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn max_width(&self, y1: usize, y2: usize) -> usize {
        self.max_width[y1 * self.height() + y2]
    }

    #[inline]
    pub fn same_width(&self, y1: usize, y2: usize) -> bool {
        self.same_width[y1 * self.height() + y2]
    }

    #[inline]
    pub fn cell(&self, x: usize, y: usize) -> StreamId {
        self.rows[y][x]
    }

    /// The rectangle covering the whole grid.
    pub fn full_rect(&self) -> Rect {
        let h = self.height();
        Rect::new(0, self.max_width(0, h - 1) - 1, 0, h - 1)
    }

    /// Cells of the rectangle, row by row, skipping columns that a
    /// narrower row does not have.
    pub fn cells(&self, r: Rect) -> Vec<StreamId> {
        let mut ret = Vec::new();
        for y in r.y1..=r.y2 {
            for x in r.x1..=r.x2.min(self.width[y] - 1) {
                ret.push(self.rows[y][x]);
            }
        }
        ret
    }
}

#[derive(Debug, Clone)]
pub enum Config {
    Filter(FilterConfig),
    Container(ContainerConfig),
}

/// Configs of all addressable streams, indexed by stream id.
#[derive(Debug, Clone)]
pub struct ConfigHierarchy {
    configs: Vec<Option<Config>>,
}

/// Cost signature used to detect structurally identical rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellSignature {
    work: u64,
    icode: u64,
    oversized: bool,
    fissable: bool,
    pop: u32,
    push: u32,
    reps: u64,
    no_horizontal_fuse: bool,
}

impl ConfigHierarchy {
    /// Build the configs of the whole tree, with memo tables able to
    /// hold up to `max_tiles` tiles.
    pub fn build(
        graph: &StreamGraph, oracle: &dyn WorkOracle,
        options: &PartitionOptions, max_tiles: usize,
    ) -> ConfigHierarchy {
        let timer = clilog::stimer!("build config hierarchy");
        let root = graph.root();
        let mut h = ConfigHierarchy {
            configs: vec![None; graph.len()],
        };
        h.build_config(graph, oracle, options, max_tiles, root);
        let aliases = h.num_aliases();
        if aliases > 0 {
            clilog::info!("aliased {} rectangles of uniform rows", aliases);
        }
        clilog::finish!(timer);
        h
    }

    fn build_config(
        &mut self, graph: &StreamGraph, oracle: &dyn WorkOracle,
        options: &PartitionOptions, max_tiles: usize, id: StreamId,
    ) {
        use ContainerKind::*;
        let (kind, rows, null_joiner) = match graph.kind(id) {
            StreamKind::Filter(_) => {
                self.configs[id.0] = Some(Config::Filter(FilterConfig {
                    filter: id,
                    fissable: is_fissable(graph, id),
                    memo: MemoTable::new(1, 1, max_tiles),
                }));
                return
            }
            StreamKind::Pipeline(children) => {
                let rows = children.iter().map(|&c| match graph.kind(c) {
                    StreamKind::SplitJoin(sj) => sj.children.clone(),
                    StreamKind::FeedbackLoop(fl) => vec![fl.body, fl.loopback],
                    _ => vec![c],
                }).collect::<Vec<_>>();
                let null_joiner = match children.last().map(|&c| graph.kind(c)) {
                    Some(StreamKind::SplitJoin(sj)) => sj.joiner.is_null(),
                    _ => false
                };
                (Pipeline, rows, null_joiner)
            }
            StreamKind::SplitJoin(sj) => {
                (SplitJoin, splitjoin_rows(graph, id, &sj.children), false)
            }
            StreamKind::FeedbackLoop(fl) => {
                (FeedbackLoop, vec![vec![fl.body, fl.loopback]], false)
            }
        };
        for row in &rows {
            for &c in row {
                self.build_config(graph, oracle, options, max_tiles, c);
            }
        }
        let mut cfg = ContainerConfig::new(
            graph, id, kind, rows, null_joiner, max_tiles);
        cfg.alias = uniform_aliases(graph, oracle, options, &cfg);
        self.configs[id.0] = Some(Config::Container(cfg));
    }

    #[inline]
    pub fn get(&self, id: StreamId) -> &Config {
        match &self.configs[id.0] {
            Some(c) => c,
            None => panic!("no config for stream {:?}", id)
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: StreamId) -> &mut Config {
        match &mut self.configs[id.0] {
            Some(c) => c,
            None => panic!("no config for stream {:?}", id)
        }
    }

    #[inline]
    pub fn container(&self, id: StreamId) -> &ContainerConfig {
        match self.get(id) {
            Config::Container(c) => c,
            Config::Filter(_) => panic!("stream {:?} is not a container", id)
        }
    }

    #[inline]
    pub fn container_mut(&mut self, id: StreamId) -> &mut ContainerConfig {
        match self.get_mut(id) {
            Config::Container(c) => c,
            Config::Filter(_) => panic!("stream {:?} is not a container", id)
        }
    }

    pub fn has_config(&self, id: StreamId) -> bool {
        self.configs[id.0].is_some()
    }

    pub fn is_filter(&self, id: StreamId) -> bool {
        matches!(self.get(id), Config::Filter(_))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Config> {
        self.configs.iter().flatten()
    }

    pub fn num_aliases(&self) -> usize {
        self.iter().map(|c| match c {
            Config::Container(c) => c.alias.len(),
            Config::Filter(_) => 0
        }).sum()
    }

    /// Total memo hits and filled entries over all configs.
    pub fn memo_stats(&self) -> (u64, usize) {
        self.iter().fold((0, 0), |(hits, filled), c| {
            let m = match c {
                Config::Container(c) => &c.memo,
                Config::Filter(f) => &f.memo,
            };
            (hits + m.hits(), filled + m.filled())
        })
    }
}

/// Rows of a split-join. When every child is a pipeline, row `y`
/// holds element `y` of each child.
fn splitjoin_rows(
    graph: &StreamGraph, id: StreamId, children: &[StreamId]
) -> Vec<Vec<StreamId>> {
    let pipes = children.iter().map(|&c| match graph.kind(c) {
        StreamKind::Pipeline(p) => Some(p),
        _ => None
    }).collect::<Option<Vec<_>>>();
    match pipes {
        Some(pipes) => {
            let h = pipes[0].len();
            assert!(pipes.iter().all(|p| p.len() == h),
                    "split-join {} is not rectangular: child pipelines \
                     have lengths {:?}", graph.name(id),
                    pipes.iter().map(|p| p.len()).collect::<Vec<_>>());
            (0..h).map(|y| pipes.iter().map(|p| p[y]).collect()).collect()
        }
        None => vec![children.to_vec()]
    }
}

fn cell_signature(
    graph: &StreamGraph, oracle: &dyn WorkOracle,
    options: &PartitionOptions, id: StreamId,
) -> Option<CellSignature> {
    let f = graph.filter(id)?;
    let icode = oracle.icode(graph, id);
    Some(CellSignature {
        work: oracle.work(graph, id),
        icode: icode.min(options.icode_threshold),
        oversized: icode > options.icode_threshold,
        fissable: is_fissable(graph, id),
        pop: f.rates.pop,
        push: f.rates.push,
        reps: oracle.reps(graph, id),
        no_horizontal_fuse: options.no_horizontal_fuse.contains(&id),
    })
}

/// Alias every rectangle inside a maximal run of uniform rows of
/// equal width onto the rectangle of the same shape at column 0.
fn uniform_aliases(
    graph: &StreamGraph, oracle: &dyn WorkOracle,
    options: &PartitionOptions, cfg: &ContainerConfig,
) -> MemoAlias {
    let uniform = cfg.rows.iter().map(|row| {
        let first = cell_signature(graph, oracle, options, row[0]);
        first.is_some() && row[1..].iter().all(|&c| {
            cell_signature(graph, oracle, options, c) == first
        })
    }).collect::<Vec<_>>();

    let mut alias = MemoAlias::default();
    let h = cfg.height();
    let mut low = 0;
    while low < h {
        if !uniform[low] {
            low += 1;
            continue
        }
        let w = cfg.width[low];
        let mut high = low;
        while high + 1 < h && uniform[high + 1] && cfg.width[high + 1] == w {
            high += 1;
        }
        for y1 in low..=high {
            for y2 in y1..=high {
                for xw in 0..w.saturating_sub(1) {
                    for xs in 1..w - xw {
                        alias.insert(Rect::new(xs, xs + xw, y1, y2),
                                     Rect::new(0, xw, y1, y2));
                    }
                }
            }
        }
        low = high + 1;
    }
    alias
}
