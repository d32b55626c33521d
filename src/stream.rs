// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Hierarchical stream graph.
//!
//! A stream program is a tree of filters composed by pipelines,
//! split-joins and feedback loops. The tree is kept in an arena and
//! nodes are addressed by [StreamId]. It is treated as immutable
//! during partitioning.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Index of a node inside a [StreamGraph].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub usize);

/// I/O rates of a filter, for the steady state and the init phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rates {
    pub peek: u32,
    pub pop: u32,
    pub push: u32,
    pub init_peek: u32,
    pub init_pop: u32,
    pub init_push: u32,
}

impl Default for Rates {
    fn default() -> Self {
        Rates {
            peek: 1, pop: 1, push: 1,
            init_peek: 0, init_pop: 0, init_push: 0,
        }
    }
}

/// A leaf filter with its cost annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// estimated work of one steady state.
    pub work: u64,
    /// estimated instruction memory footprint.
    pub icode: u64,
    /// whether the filter carries mutable state across firings.
    pub stateful: bool,
    /// steady-state repetitions, used to scale rates into traffic.
    pub reps: u64,
    pub rates: Rates,
}

impl Filter {
    /// A stateless filter with unit rates.
    pub fn new(work: u64) -> Filter {
        Filter {
            work,
            icode: 0,
            stateful: false,
            reps: 1,
            rates: Rates::default(),
        }
    }

    pub fn with_icode(mut self, icode: u64) -> Filter {
        self.icode = icode;
        self
    }

    pub fn stateful(mut self) -> Filter {
        self.stateful = true;
        self
    }

    pub fn with_rates(mut self, rates: Rates) -> Filter {
        self.rates = rates;
        self
    }
}

/// The kind of a splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Splitter {
    Null,
    Duplicate,
    RoundRobin(Vec<u32>),
}

/// The kind of a joiner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joiner {
    Null,
    RoundRobin(Vec<u32>),
}

impl Joiner {
    /// A null joiner merges nothing and needs no tile.
    pub fn is_null(&self) -> bool {
        match self {
            Joiner::Null => true,
            Joiner::RoundRobin(w) => w.iter().all(|&w| w == 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitJoin {
    pub splitter: Splitter,
    pub joiner: Joiner,
    pub children: Vec<StreamId>,
}

/// A feedback loop. Only its body and loopback path take part in
/// partitioning, side by side as a width-2 row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackLoop {
    pub joiner: Joiner,
    pub splitter: Splitter,
    pub body: StreamId,
    pub loopback: StreamId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamKind {
    Filter(Filter),
    Pipeline(Vec<StreamId>),
    SplitJoin(SplitJoin),
    FeedbackLoop(FeedbackLoop),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamNode {
    pub name: CompactString,
    pub parent: Option<StreamId>,
    pub kind: StreamKind,
}

/// The arena holding a whole stream program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamGraph {
    pub nodes: Vec<StreamNode>,
    root: Option<StreamId>,
}

impl StreamGraph {
    pub fn new() -> StreamGraph {
        Default::default()
    }

    fn add_node(&mut self, name: &str, kind: StreamKind) -> StreamId {
        let id = StreamId(self.nodes.len());
        let children = match &kind {
            StreamKind::Filter(_) => vec![],
            StreamKind::Pipeline(c) => c.clone(),
            StreamKind::SplitJoin(sj) => sj.children.clone(),
            StreamKind::FeedbackLoop(fl) => vec![fl.body, fl.loopback],
        };
        self.nodes.push(StreamNode {
            name: name.into(),
            parent: None,
            kind,
        });
        for c in children {
            let child = &mut self.nodes[c.0];
            assert!(child.parent.is_none(),
                    "stream {} already has a parent", child.name);
            child.parent = Some(id);
        }
        id
    }

    pub fn add_filter(&mut self, name: &str, filter: Filter) -> StreamId {
        self.add_node(name, StreamKind::Filter(filter))
    }

    pub fn add_pipeline(&mut self, name: &str, children: Vec<StreamId>) -> StreamId {
        assert!(!children.is_empty(), "pipeline {} has no children", name);
        self.add_node(name, StreamKind::Pipeline(children))
    }

    pub fn add_splitjoin(
        &mut self, name: &str,
        splitter: Splitter, joiner: Joiner,
        children: Vec<StreamId>
    ) -> StreamId {
        assert!(!children.is_empty(), "splitjoin {} has no children", name);
        self.add_node(name, StreamKind::SplitJoin(SplitJoin {
            splitter, joiner, children
        }))
    }

    pub fn add_feedback_loop(
        &mut self, name: &str,
        joiner: Joiner, splitter: Splitter,
        body: StreamId, loopback: StreamId,
    ) -> StreamId {
        self.add_node(name, StreamKind::FeedbackLoop(FeedbackLoop {
            joiner, splitter, body, loopback
        }))
    }

    pub fn set_root(&mut self, root: StreamId) {
        assert!(self.nodes[root.0].parent.is_none(),
                "root {} must not have a parent", self.nodes[root.0].name);
        self.root = Some(root);
    }

    /// The toplevel stream.
    pub fn root(&self) -> StreamId {
        self.root.expect("stream graph has no root")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: StreamId) -> &StreamNode {
        &self.nodes[id.0]
    }

    pub fn name(&self, id: StreamId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn kind(&self, id: StreamId) -> &StreamKind {
        &self.nodes[id.0].kind
    }

    pub fn filter(&self, id: StreamId) -> Option<&Filter> {
        match &self.nodes[id.0].kind {
            StreamKind::Filter(f) => Some(f),
            _ => None
        }
    }

    pub fn is_filter(&self, id: StreamId) -> bool {
        self.filter(id).is_some()
    }

    /// Direct children in structural order.
    pub fn children(&self, id: StreamId) -> Vec<StreamId> {
        match &self.nodes[id.0].kind {
            StreamKind::Filter(_) => vec![],
            StreamKind::Pipeline(c) => c.clone(),
            StreamKind::SplitJoin(sj) => sj.children.clone(),
            StreamKind::FeedbackLoop(fl) => vec![fl.body, fl.loopback],
        }
    }

    /// Look up a node by name. Names are not required to be unique;
    /// the first match is returned.
    pub fn find(&self, name: &str) -> Option<StreamId> {
        self.nodes.iter().position(|n| n.name == name).map(StreamId)
    }

    /// Whether any container above `id` is a feedback loop.
    pub fn has_feedback_ancestor(&self, id: StreamId) -> bool {
        let mut cur = self.nodes[id.0].parent;
        while let Some(p) = cur {
            if matches!(self.nodes[p.0].kind, StreamKind::FeedbackLoop(_)) {
                return true
            }
            cur = self.nodes[p.0].parent;
        }
        false
    }

    /// Enumerate all filters under `id` (inclusive) in
    /// structural order.
    pub fn for_each_filter(&self, id: StreamId, f: &mut impl FnMut(StreamId)) {
        match &self.nodes[id.0].kind {
            StreamKind::Filter(_) => f(id),
            _ => {
                for c in self.children(id) {
                    self.for_each_filter(c, f);
                }
            }
        }
    }

    pub fn filters_under(&self, id: StreamId) -> Vec<StreamId> {
        let mut ret = Vec::new();
        self.for_each_filter(id, &mut |f| ret.push(f));
        ret
    }

    /// Sum of the annotated work of all filters under `id`.
    pub fn total_work(&self, id: StreamId) -> u64 {
        let mut tot = 0u64;
        self.for_each_filter(id, &mut |f| {
            tot += self.filter(f).map_or(0, |f| f.work);
        });
        tot
    }

    /// Build a graph from a textual description.
    pub fn from_spec(spec: &StreamSpec) -> StreamGraph {
        let mut graph = StreamGraph::new();
        let root = graph.add_spec(spec);
        graph.set_root(root);
        graph
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<StreamGraph> {
        let spec: StreamSpec = serde_json::from_str(s)?;
        Ok(StreamGraph::from_spec(&spec))
    }

    fn add_spec(&mut self, spec: &StreamSpec) -> StreamId {
        fn unit_rr(n: usize) -> Vec<u32> {
            vec![1; n]
        }
        match spec {
            StreamSpec::Filter { name, work, icode, stateful, reps, rates } => {
                self.add_filter(name, Filter {
                    work: *work,
                    icode: *icode,
                    stateful: *stateful,
                    reps: *reps,
                    rates: *rates,
                })
            }
            StreamSpec::Pipeline { name, children } => {
                let children = children.iter()
                    .map(|c| self.add_spec(c)).collect();
                self.add_pipeline(name, children)
            }
            StreamSpec::SplitJoin { name, splitter, joiner, children } => {
                let children = children.iter()
                    .map(|c| self.add_spec(c)).collect::<Vec<_>>();
                let n = children.len();
                self.add_splitjoin(
                    name,
                    splitter.clone().unwrap_or_else(|| Splitter::RoundRobin(unit_rr(n))),
                    joiner.clone().unwrap_or_else(|| Joiner::RoundRobin(unit_rr(n))),
                    children
                )
            }
            StreamSpec::FeedbackLoop { name, joiner, splitter, body, loopback } => {
                let body = self.add_spec(body);
                let loopback = self.add_spec(loopback);
                self.add_feedback_loop(
                    name,
                    joiner.clone().unwrap_or_else(|| Joiner::RoundRobin(unit_rr(2))),
                    splitter.clone().unwrap_or_else(|| Splitter::RoundRobin(unit_rr(2))),
                    body, loopback
                )
            }
        }
    }
}

fn default_reps() -> u64 {
    1
}

/// Serialized description of a stream program, as read from JSON.
///
/// Example:
/// ```json
/// {"pipeline": {"name": "top", "children": [
///     {"filter": {"name": "src", "work": 10, "stateful": true}},
///     {"split_join": {"name": "sj", "children": [
///         {"filter": {"name": "a", "work": 100}},
///         {"filter": {"name": "b", "work": 100}}]}}]}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSpec {
    Filter {
        name: CompactString,
        work: u64,
        #[serde(default)]
        icode: u64,
        #[serde(default)]
        stateful: bool,
        #[serde(default = "default_reps")]
        reps: u64,
        #[serde(default)]
        rates: Rates,
    },
    Pipeline {
        name: CompactString,
        children: Vec<StreamSpec>,
    },
    SplitJoin {
        name: CompactString,
        #[serde(default)]
        splitter: Option<Splitter>,
        #[serde(default)]
        joiner: Option<Joiner>,
        children: Vec<StreamSpec>,
    },
    FeedbackLoop {
        name: CompactString,
        #[serde(default)]
        joiner: Option<Joiner>,
        #[serde(default)]
        splitter: Option<Splitter>,
        body: Box<StreamSpec>,
        loopback: Box<StreamSpec>,
    },
}
