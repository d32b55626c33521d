// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Seeded random stream programs, already rectangular.

use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use crate::stream::{Filter, Joiner, Rates, Splitter, StreamGraph, StreamId};

#[derive(Debug, Clone)]
pub struct SynthParams {
    /// maximum container nesting.
    pub max_depth: usize,
    /// maximum number of children of a container.
    pub max_children: usize,
    pub max_work: u64,
    pub max_icode: u64,
    pub stateful_prob: f64,
    pub feedback_prob: f64,
    pub null_joiner_prob: f64,
}

impl Default for SynthParams {
    fn default() -> Self {
        SynthParams {
            max_depth: 3,
            max_children: 3,
            max_work: 100,
            max_icode: 2000,
            stateful_prob: 0.3,
            feedback_prob: 0.1,
            null_joiner_prob: 0.1,
        }
    }
}

struct Synth<'p> {
    rng: ChaCha20Rng,
    params: &'p SynthParams,
    graph: StreamGraph,
    counter: usize,
}

impl Synth<'_> {
    fn name(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}{}", prefix, self.counter)
    }

    fn filter(&mut self) -> StreamId {
        let pop = self.rng.gen_range(1..=2);
        let rates = Rates {
            peek: pop + self.rng.gen_range(0..=1),
            pop,
            push: self.rng.gen_range(1..=2),
            ..Default::default()
        };
        let f = Filter {
            work: self.rng.gen_range(1..=self.params.max_work),
            icode: self.rng.gen_range(0..=self.params.max_icode),
            stateful: self.rng.gen_bool(self.params.stateful_prob),
            reps: self.rng.gen_range(1..=3),
            rates,
        };
        let name = self.name("f");
        self.graph.add_filter(&name, f)
    }

    fn weights(&mut self, n: usize) -> Vec<u32> {
        // unit weights often enough that adjacent split-joins match.
        if self.rng.gen_bool(0.5) {
            vec![1; n]
        }
        else {
            (0..n).map(|_| self.rng.gen_range(1..=2)).collect()
        }
    }

    fn joiner(&mut self, n: usize) -> Joiner {
        if self.rng.gen_bool(self.params.null_joiner_prob) {
            Joiner::Null
        }
        else {
            Joiner::RoundRobin(self.weights(n))
        }
    }

    fn splitter(&mut self, n: usize) -> Splitter {
        if self.rng.gen_bool(0.3) {
            Splitter::Duplicate
        }
        else {
            Splitter::RoundRobin(self.weights(n))
        }
    }

    fn num_children(&mut self) -> usize {
        self.rng.gen_range(2..=self.params.max_children.max(2))
    }

    /// Any stream.
    fn stream(&mut self, depth: usize) -> StreamId {
        if depth == 0 || self.rng.gen_bool(0.35) {
            return self.filter()
        }
        match self.rng.gen_range(0..3) {
            0 => self.pipeline(depth),
            _ => self.non_pipeline(depth),
        }
    }

    /// A filter, split-join or feedback loop.
    fn non_pipeline(&mut self, depth: usize) -> StreamId {
        if depth == 0 {
            return self.filter()
        }
        if self.rng.gen_bool(self.params.feedback_prob) {
            let body = self.stream(depth - 1);
            let lb = self.filter();
            let name = self.name("fl");
            let joiner = Joiner::RoundRobin(self.weights(2));
            let splitter = self.splitter(2);
            return self.graph.add_feedback_loop(&name, joiner, splitter, body, lb)
        }
        if self.rng.gen_bool(0.25) {
            return self.filter()
        }
        self.splitjoin(depth)
    }

    fn pipeline(&mut self, depth: usize) -> StreamId {
        let n = self.num_children();
        let children = (0..n).map(|_| self.stream(depth - 1)).collect();
        let name = self.name("p");
        self.graph.add_pipeline(&name, children)
    }

    fn splitjoin(&mut self, depth: usize) -> StreamId {
        let n = self.num_children();
        let children = if depth >= 2 && self.rng.gen_bool(0.4) {
            // columns of pipelines, all of the same length.
            let h = self.num_children();
            (0..n).map(|_| {
                let elems = (0..h).map(|_| self.stream(depth - 2)).collect();
                let name = self.name("c");
                self.graph.add_pipeline(&name, elems)
            }).collect()
        }
        else {
            (0..n).map(|_| self.non_pipeline(depth - 1)).collect()
        };
        let name = self.name("sj");
        let splitter = self.splitter(n);
        let joiner = self.joiner(n);
        self.graph.add_splitjoin(&name, splitter, joiner, children)
    }
}

/// Generate a random stream program from `seed`.
pub fn random_stream(seed: u64, params: &SynthParams) -> StreamGraph {
    let mut s = Synth {
        rng: ChaCha20Rng::seed_from_u64(seed),
        params,
        graph: StreamGraph::new(),
        counter: 0,
    };
    let depth = params.max_depth.max(1);
    let root = match s.rng.gen_range(0..2) {
        0 => s.pipeline(depth),
        _ => s.splitjoin(depth),
    };
    s.graph.set_root(root);
    s.graph
}
