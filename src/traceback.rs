// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Reconstruction of the chosen partitioning.
//!
//! Traceback walks the same recursion as the dynamic program. At each
//! rectangle it recomputes the candidate cuts in the same order and
//! takes the first one reproducing the memoized cost exactly. Every
//! cut starts a new partition record for its second half.

use crate::config::Config;
use crate::fission::trace_filter;
use crate::memo::Rect;
use crate::partitioner::DpPartitioner;
use crate::record::{PartitionEntry, PartitionRecord, Partitions};
use crate::rewrite::RewriteOp;
use crate::stream::StreamId;

impl DpPartitioner<'_> {
    /// Partition records and rewrite plan of the root for `tiles`
    /// tiles. Also sets the bottleneck used for pruning.
    pub fn traceback(&mut self, tiles: usize) -> (Vec<PartitionRecord>, RewriteOp) {
        let timer = clilog::stimer!("traceback");
        let root = self.graph.root();
        self.bottleneck = self.cost(root, tiles, false).max;
        let mut partitions = Partitions::new();
        let op = self.trace_stream(root, tiles, false, &mut partitions);
        clilog::finish!(timer);
        (partitions.into_records(), op)
    }

    fn trace_stream(
        &mut self, stream: StreamId, tiles: usize, next_to_joiner: bool,
        partitions: &mut Partitions,
    ) -> RewriteOp {
        let ntj = self.effective_ntj(stream, next_to_joiner);
        let (fissable, full) = match self.configs.get(stream) {
            Config::Filter(fc) => (fc.fissable, None),
            Config::Container(c) => (false, Some(c.full_rect())),
        };
        match full {
            None => {
                let work = self.oracle.work(self.graph, stream);
                trace_filter(self.graph, &self.options, stream, work, fissable,
                             tiles, ntj, self.bottleneck, partitions)
            }
            Some(full) => self.trace_rect(stream, full, tiles, ntj, partitions)
        }
    }

    fn trace_rect(
        &mut self, cont: StreamId, r: Rect, tiles: usize, next_to_joiner: bool,
        partitions: &mut Partitions,
    ) -> RewriteOp {
        let ntj = next_to_joiner || !self.options.joiners_need_tiles;
        let r = self.clamp(cont, r);

        if r.is_cell() {
            let c = self.configs.container(cont);
            let child = c.cell(r.x1, r.y1);
            let single = c.full_rect().is_cell();
            let op = self.trace_stream(child, tiles, ntj, partitions);
            return match single {
                true => RewriteOp::Descend { container: cont, child: Box::new(op) },
                false => op
            }
        }

        if tiles == 1 {
            clilog::trace!("fuse {} {}", self.graph.name(cont), r);
            self.record_fused(cont, r, partitions);
            return RewriteOp::Fuse { container: cont, rect: r }
        }

        let needs_joiner = self.configs.container(cont).width[r.y2] > 1 && !ntj;
        let avail = if needs_joiner { tiles - 1 } else { tiles };
        if avail == 1 && r.y1 == r.y2 {
            return self.trace_rect(cont, r, 1, true, partitions)
        }

        let target = self.get(cont, r, tiles, ntj);

        if let Some(sync) = self.vertical_cut(cont, r, avail) {
            for xp in r.x1..r.x2 {
                for tp in 1..avail {
                    let left = Rect { x2: xp, ..r };
                    let right = Rect { x1: xp + 1, ..r };
                    let a = self.get(cont, left, tp, true);
                    let b = self.get(cont, right, avail - tp, true);
                    if a.parallel(b) != target {
                        continue
                    }
                    clilog::trace!("cut {} {} vertically after column {}, {}+{} tiles ({:?})",
                                   self.graph.name(cont), r, xp, tp, avail - tp, sync);
                    let left_op = self.trace_rect(cont, left, tp, true, partitions);
                    partitions.open();
                    let right_op = self.trace_rect(cont, right, avail - tp, true, partitions);
                    return RewriteOp::VerticalCut {
                        container: cont, rect: r, pivot: xp, sync,
                        left: Box::new(left_op),
                        right: Box::new(right_op),
                    }
                }
            }
        }

        for yp in r.y1..r.y2 {
            for tp in 1..tiles {
                let top = Rect { y2: yp, ..r };
                let bottom = Rect { y1: yp + 1, ..r };
                let a = self.get(cont, top, tp, false);
                let b = self.get(cont, bottom, tiles - tp, ntj);
                if a.parallel(b) != target {
                    continue
                }
                clilog::trace!("cut {} {} horizontally after row {}, {}+{} tiles",
                               self.graph.name(cont), r, yp, tp, tiles - tp);
                let top_op = self.trace_rect(cont, top, tp, false, partitions);
                partitions.open();
                let bottom_op = self.trace_rect(cont, bottom, tiles - tp, ntj, partitions);
                return RewriteOp::HorizontalCut {
                    container: cont, rect: r, pivot: yp,
                    top: Box::new(top_op),
                    bottom: Box::new(bottom_op),
                }
            }
        }

        panic!("no traceback for {} {} with {} tiles (next to joiner: {}), \
                memoized {:?}", self.graph.name(cont), r, tiles, ntj, target)
    }

    /// Record everything in `r` onto the current tile, following the
    /// same decomposition as the fused cost so that fusion overheads
    /// land in the record too.
    fn record_fused(&self, cont: StreamId, r: Rect, partitions: &mut Partitions) {
        let r = self.clamp(cont, r);
        if r.is_cell() {
            let child = self.configs.container(cont).cell(r.x1, r.y1);
            self.record_fused_stream(child, partitions);
            return
        }
        match self.fuse_pivot(cont, r) {
            Some(p) => {
                self.record_fused(cont, Rect { y2: p, ..r }, partitions);
                self.record_fused(cont, Rect { y1: p + 1, ..r }, partitions);
            }
            None => {
                for x in r.x1..=r.x2 {
                    self.record_fused(cont, Rect { x1: x, x2: x, ..r }, partitions);
                }
                let overhead = self.horizontal_overhead(cont, r);
                if overhead > 0 {
                    partitions.add(PartitionEntry::FusionOverhead { container: cont }, overhead);
                }
            }
        }
    }

    fn record_fused_stream(&self, stream: StreamId, partitions: &mut Partitions) {
        match self.configs.get(stream) {
            Config::Filter(_) => {
                let work = self.oracle.work(self.graph, stream);
                partitions.add(PartitionEntry::Filter(stream), work);
            }
            Config::Container(c) => {
                let full = c.full_rect();
                self.record_fused(stream, full, partitions);
            }
        }
    }
}
