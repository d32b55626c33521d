// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Driver-supplied partitioning options.

use indexmap::IndexSet;
use crate::stream::StreamId;

/// Default per-tile instruction memory budget.
pub const ICODE_THRESHOLD: u64 = 16000;

#[derive(Debug, Clone)]
pub struct PartitionOptions {
    /// target number of tiles.
    pub num_tiles: usize,
    /// whether a joiner after a vertical cut occupies a tile.
    pub joiners_need_tiles: bool,
    /// whether fused tiles must fit within `icode_threshold`.
    pub limit_icode: bool,
    pub icode_threshold: u64,
    /// use exactly `num_tiles`. when false, more tiles may be used
    /// if they improve load balance.
    pub strict: bool,
    /// skip fission of filters already below the bottleneck.
    pub pruning_on_traceback: bool,
    /// filters that must never be fused side by side with others.
    pub no_horizontal_fuse: IndexSet<StreamId>,
    /// work added to every fissed replica.
    pub fission_overhead: u64,
    pub max_fission_factor: usize,
    /// per-item fusion penalty on the rates of fused filters.
    pub horizontal_filter_overhead_factor: u64,
    /// flat fusion penalty for fused containers.
    pub horizontal_container_overhead: u64,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        PartitionOptions {
            num_tiles: 16,
            joiners_need_tiles: true,
            limit_icode: false,
            icode_threshold: ICODE_THRESHOLD,
            strict: true,
            pruning_on_traceback: true,
            no_horizontal_fuse: IndexSet::new(),
            fission_overhead: 1,
            max_fission_factor: 3,
            horizontal_filter_overhead_factor: 0,
            horizontal_container_overhead: 0,
        }
    }
}

impl PartitionOptions {
    pub fn with_tiles(num_tiles: usize) -> PartitionOptions {
        PartitionOptions { num_tiles, ..Default::default() }
    }
}
