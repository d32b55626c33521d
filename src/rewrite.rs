// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Rewrite plans produced by traceback.
//!
//! The partitioner never changes the stream graph itself. It returns
//! a tree of [RewriteOp]s that a graph transformer applies through
//! the [StreamRewriter] interface.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use crate::fission::FissionPlan;
use crate::memo::Rect;
use crate::stream::{StreamGraph, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    Keep,
    /// merge the pipeline rows of the rectangle into one split-join
    /// before cutting.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewriteOp {
    /// leave the stream as it is.
    Identity { stream: StreamId },
    /// a container with a single cell: apply the op to that cell only.
    Descend { container: StreamId, child: Box<RewriteOp> },
    /// fuse the rectangle into one filter.
    Fuse { container: StreamId, rect: Rect },
    Fiss(FissionPlan),
    /// split columns `x1..=pivot` from `pivot+1..=x2`.
    VerticalCut {
        container: StreamId,
        rect: Rect,
        pivot: usize,
        sync: SyncAction,
        left: Box<RewriteOp>,
        right: Box<RewriteOp>,
    },
    /// split rows `y1..=pivot` from `pivot+1..=y2`.
    HorizontalCut {
        container: StreamId,
        rect: Rect,
        pivot: usize,
        top: Box<RewriteOp>,
        bottom: Box<RewriteOp>,
    },
}

/// Graph surgery primitives invoked when a plan is applied.
pub trait StreamRewriter {
    fn remove_sync(&mut self, graph: &StreamGraph, container: StreamId, rect: Rect);

    fn cut_vertical(&mut self, graph: &StreamGraph, container: StreamId, rect: Rect, pivot: usize);

    fn cut_horizontal(&mut self, graph: &StreamGraph, container: StreamId, rect: Rect, pivot: usize);

    fn fuse(&mut self, graph: &StreamGraph, container: StreamId, rect: Rect);

    fn replicate(&mut self, graph: &StreamGraph, plan: &FissionPlan);
}

impl RewriteOp {
    /// Apply the plan pre-order: sync removal, then the cut itself,
    /// then the first and second halves.
    pub fn apply(&self, graph: &StreamGraph, rw: &mut dyn StreamRewriter) {
        use RewriteOp::*;
        match self {
            Identity { .. } => {}
            Descend { child, .. } => child.apply(graph, rw),
            Fuse { container, rect } => rw.fuse(graph, *container, *rect),
            Fiss(plan) => rw.replicate(graph, plan),
            VerticalCut { container, rect, pivot, sync, left, right } => {
                if *sync == SyncAction::Remove {
                    rw.remove_sync(graph, *container, *rect);
                }
                rw.cut_vertical(graph, *container, *rect, *pivot);
                left.apply(graph, rw);
                right.apply(graph, rw);
            }
            HorizontalCut { container, rect, pivot, top, bottom } => {
                rw.cut_horizontal(graph, *container, *rect, *pivot);
                top.apply(graph, rw);
                bottom.apply(graph, rw);
            }
        }
    }

    /// Number of fused rectangles and fissed filters in the plan.
    pub fn count_transforms(&self) -> (usize, usize) {
        use RewriteOp::*;
        match self {
            Identity { .. } => (0, 0),
            Descend { child, .. } => child.count_transforms(),
            Fuse { .. } => (1, 0),
            Fiss(_) => (0, 1),
            VerticalCut { left: a, right: b, .. } |
            HorizontalCut { top: a, bottom: b, .. } => {
                let (fa, sa) = a.count_transforms();
                let (fb, sb) = b.count_transforms();
                (fa + fb, sa + sb)
            }
        }
    }

    /// Indented, human-readable form of the plan.
    pub fn pretty(&self, graph: &StreamGraph) -> String {
        let mut s = String::new();
        self.pretty_into(graph, 0, &mut s).unwrap();
        s
    }

    fn pretty_into(&self, graph: &StreamGraph, indent: usize, s: &mut String) -> fmt::Result {
        use RewriteOp::*;
        let pad = "  ".repeat(indent);
        match self {
            Identity { stream } => writeln!(s, "{}identity {}", pad, graph.name(*stream)),
            Descend { container, child } => {
                writeln!(s, "{}descend {}", pad, graph.name(*container))?;
                child.pretty_into(graph, indent + 1, s)
            }
            Fuse { container, rect } => {
                writeln!(s, "{}fuse {} {}", pad, graph.name(*container), rect)
            }
            Fiss(plan) => {
                writeln!(s, "{}fiss {} x{}", pad, graph.name(plan.filter), plan.ways)
            }
            VerticalCut { container, rect, pivot, sync, left, right } => {
                writeln!(s, "{}vertical cut {} {} at column {}{}", pad,
                         graph.name(*container), rect, pivot,
                         if *sync == SyncAction::Remove { " (sync removed)" } else { "" })?;
                left.pretty_into(graph, indent + 1, s)?;
                right.pretty_into(graph, indent + 1, s)
            }
            HorizontalCut { container, rect, pivot, top, bottom } => {
                writeln!(s, "{}horizontal cut {} {} at row {}", pad,
                         graph.name(*container), rect, pivot)?;
                top.pretty_into(graph, indent + 1, s)?;
                bottom.pretty_into(graph, indent + 1, s)
            }
        }
    }
}

/// One primitive invocation recorded by [RewriteLog].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewriteStep {
    RemoveSync { container: StreamId, rect: Rect },
    CutVertical { container: StreamId, rect: Rect, pivot: usize },
    CutHorizontal { container: StreamId, rect: Rect, pivot: usize },
    Fuse { container: StreamId, rect: Rect },
    Replicate { filter: StreamId, ways: usize },
}

/// A rewriter that only records the ordered primitive calls.
#[derive(Debug, Clone, Default)]
pub struct RewriteLog {
    steps: Vec<RewriteStep>,
}

impl RewriteLog {
    pub fn steps(&self) -> &[RewriteStep] {
        &self.steps
    }

    pub fn display<'a>(&'a self, graph: &'a StreamGraph) -> RewriteLogDisplay<'a> {
        RewriteLogDisplay { log: self, graph }
    }
}

impl StreamRewriter for RewriteLog {
    fn remove_sync(&mut self, _: &StreamGraph, container: StreamId, rect: Rect) {
        self.steps.push(RewriteStep::RemoveSync { container, rect });
    }

    fn cut_vertical(&mut self, _: &StreamGraph, container: StreamId, rect: Rect, pivot: usize) {
        self.steps.push(RewriteStep::CutVertical { container, rect, pivot });
    }

    fn cut_horizontal(&mut self, _: &StreamGraph, container: StreamId, rect: Rect, pivot: usize) {
        self.steps.push(RewriteStep::CutHorizontal { container, rect, pivot });
    }

    fn fuse(&mut self, _: &StreamGraph, container: StreamId, rect: Rect) {
        self.steps.push(RewriteStep::Fuse { container, rect });
    }

    fn replicate(&mut self, _: &StreamGraph, plan: &FissionPlan) {
        self.steps.push(RewriteStep::Replicate { filter: plan.filter, ways: plan.ways });
    }
}

pub struct RewriteLogDisplay<'a> {
    log: &'a RewriteLog,
    graph: &'a StreamGraph,
}

impl fmt::Display for RewriteLogDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use RewriteStep::*;
        let g = self.graph;
        for (i, step) in self.log.steps.iter().enumerate() {
            write!(f, "{:>4}: ", i)?;
            match step {
                RemoveSync { container, rect } => {
                    writeln!(f, "remove sync in {} {}", g.name(*container), rect)?
                }
                CutVertical { container, rect, pivot } => {
                    writeln!(f, "cut {} {} vertically after column {}",
                             g.name(*container), rect, pivot)?
                }
                CutHorizontal { container, rect, pivot } => {
                    writeln!(f, "cut {} {} horizontally after row {}",
                             g.name(*container), rect, pivot)?
                }
                Fuse { container, rect } => {
                    writeln!(f, "fuse {} {}", g.name(*container), rect)?
                }
                Replicate { filter, ways } => {
                    writeln!(f, "replicate {} {} ways", g.name(*filter), ways)?
                }
            }
        }
        Ok(())
    }
}
