// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Partition a stream program onto tiles.

use std::path::PathBuf;
use streampart::options::{PartitionOptions, ICODE_THRESHOLD};
use streampart::partitioner::DpPartitioner;
use streampart::rewrite::RewriteLog;
use streampart::stream::StreamGraph;

#[derive(clap::Parser, Debug)]
struct PartitionArgs {
    /// JSON description of the stream program.
    stream_json: PathBuf,
    /// Number of tiles to partition onto.
    #[clap(long, default_value_t=16)]
    tiles: usize,
    /// Joiners do not need a tile of their own.
    #[clap(long)]
    free_joiners: bool,
    /// Keep every tile within the instruction memory threshold.
    #[clap(long)]
    limit_icode: bool,
    #[clap(long, default_value_t=ICODE_THRESHOLD)]
    icode_threshold: u64,
    /// Allow using more tiles than requested when it balances
    /// the load better.
    #[clap(long)]
    adaptive: bool,
    /// Always fiss filters when tiles are available, even if they
    /// are already below the bottleneck.
    #[clap(long)]
    no_pruning: bool,
    /// Filters that must not be fused side by side with others,
    /// by name.
    #[clap(long, value_delimiter=',')]
    no_horiz_fuse: Vec<String>,
    #[clap(long, default_value_t=1)]
    fission_overhead: u64,
    #[clap(long, default_value_t=3)]
    max_fission_factor: usize,
    #[clap(long, default_value_t=0)]
    horizontal_filter_overhead: u64,
    #[clap(long, default_value_t=0)]
    horizontal_container_overhead: u64,
    /// Output path for the serialized partition result.
    #[clap(long)]
    output: Option<PathBuf>,
    /// Print the rewrite plan and the primitive steps it implies.
    #[clap(long)]
    print_plan: bool,
}

fn main() {
    clilog::init_stderr_color_debug();
    clilog::enable_timer("dp_partition");
    clilog::enable_timer("streampart");
    let args = <PartitionArgs as clap::Parser>::parse();
    clilog::info!("Partition args:\n{:#?}", args);

    let text = std::fs::read_to_string(&args.stream_json)
        .expect("cannot read stream description");
    let graph = StreamGraph::from_json_str(&text)
        .expect("cannot parse stream description");
    clilog::info!("loaded {} streams, {} filters, total work {}",
                  graph.len(), graph.filters_under(graph.root()).len(),
                  graph.total_work(graph.root()));

    let mut options = PartitionOptions {
        num_tiles: args.tiles,
        joiners_need_tiles: !args.free_joiners,
        limit_icode: args.limit_icode,
        icode_threshold: args.icode_threshold,
        strict: !args.adaptive,
        pruning_on_traceback: !args.no_pruning,
        fission_overhead: args.fission_overhead,
        max_fission_factor: args.max_fission_factor,
        horizontal_filter_overhead_factor: args.horizontal_filter_overhead,
        horizontal_container_overhead: args.horizontal_container_overhead,
        ..Default::default()
    };
    for name in &args.no_horiz_fuse {
        match graph.find(name) {
            Some(id) if graph.is_filter(id) => {
                options.no_horizontal_fuse.insert(id);
            }
            _ => clilog::warn!("no filter named {}, ignored", name)
        }
    }

    let mut dp = DpPartitioner::new(&graph, options);
    let result = dp.partition();

    if args.print_plan {
        println!("{}", result.rewrite.pretty(&graph));
        let mut log = RewriteLog::default();
        result.rewrite.apply(&graph, &mut log);
        print!("{}", log.display(&graph));
    }

    if let Some(output) = &args.output {
        let f = std::fs::File::create(output).unwrap();
        let mut buf = std::io::BufWriter::new(f);
        serde_bare::to_writer(&mut buf, &result).unwrap();
        clilog::info!("partition result written to {}", output.display());
    }
}
