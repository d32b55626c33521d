// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Bottleneck of a stream program for every tile count.

use std::path::PathBuf;
use streampart::options::PartitionOptions;
use streampart::oracle::AnnotatedWork;
use streampart::partitioner::scaling_statistics;
use streampart::stream::StreamGraph;
use streampart::synth::{random_stream, SynthParams};
use streampart::sync::MatchingSyncRemoval;

#[derive(clap::Parser, Debug)]
struct ScalingArgs {
    /// JSON description of the stream program.
    ///
    /// If not specified, a random program is generated from `--seed`.
    stream_json: Option<PathBuf>,
    /// Seed of the random program.
    #[clap(long, default_value_t=0)]
    seed: u64,
    /// Nesting depth of the random program.
    #[clap(long, default_value_t=3)]
    depth: usize,
    /// Largest tile count to try.
    #[clap(long, default_value_t=16)]
    max_tiles: usize,
    /// Joiners do not need a tile of their own.
    #[clap(long)]
    free_joiners: bool,
}

fn main() {
    clilog::init_stderr_color_debug();
    clilog::enable_timer("dp_scaling");
    clilog::enable_timer("streampart");
    let args = <ScalingArgs as clap::Parser>::parse();
    clilog::info!("Scaling args:\n{:#?}", args);

    let graph = match &args.stream_json {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .expect("cannot read stream description");
            StreamGraph::from_json_str(&text)
                .expect("cannot parse stream description")
        }
        None => random_stream(args.seed, &SynthParams {
            max_depth: args.depth,
            ..Default::default()
        })
    };
    let options = PartitionOptions {
        joiners_need_tiles: !args.free_joiners,
        ..Default::default()
    };
    let points = scaling_statistics(
        &graph, &AnnotatedWork, &MatchingSyncRemoval, &options, args.max_tiles);

    println!("tiles\tbottleneck\tpartitions\tspeedup");
    let base = points.first().map(|p| p.bottleneck).unwrap_or(0);
    for p in &points {
        let speedup = if p.bottleneck == 0 { 0. } else { base as f64 / p.bottleneck as f64 };
        println!("{}\t{}\t{}\t{:.2}", p.tiles, p.bottleneck, p.partitions, speedup);
    }
}
