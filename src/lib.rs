// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
pub mod stream;

pub mod oracle;

pub mod sync;

pub mod cost;

pub mod memo;

pub mod options;

pub mod config;

pub mod record;

pub mod rewrite;

pub mod fission;

pub mod partitioner;

pub mod traceback;

pub mod synth;
