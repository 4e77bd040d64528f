// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Level capacity schedule and weight bookkeeping.
//!
//! Capacities follow the canonical DataSketches schedule
//! `cap(depth) = max(m, ceil(k * (2/3)^depth))`, where depth counts down
//! from the top level. The arithmetic below reproduces the reference
//! integer recurrence exactly; the serialized levels array is derived from
//! these values, so any deviation breaks cross-implementation
//! compatibility.

const POWERS_OF_THREE: [u64; 31] = [
    1,
    3,
    9,
    27,
    81,
    243,
    729,
    2187,
    6561,
    19683,
    59049,
    177147,
    531441,
    1594323,
    4782969,
    14348907,
    43046721,
    129140163,
    387420489,
    1162261467,
    3486784401,
    10460353203,
    31381059609,
    94143178827,
    282429536481,
    847288609443,
    2541865828329,
    7625597484987,
    22876792454961,
    68630377364883,
    205891132094649,
];

/// Sum of the capacities of all levels of a sketch with `num_levels` levels.
pub(super) fn total_capacity(k: u16, m: u8, num_levels: usize) -> u32 {
    (0..num_levels)
        .map(|level| level_capacity(k, num_levels, level, m))
        .sum()
}

/// Capacity of the level at `height` in a sketch with `num_levels` levels.
///
/// Level 0 is the widest; capacity shrinks geometrically with depth below
/// the top level, floored at `min_width`.
pub(super) fn level_capacity(k: u16, num_levels: usize, height: usize, min_width: u8) -> u32 {
    assert!(height < num_levels, "height must be < num_levels");
    let depth = (num_levels - height - 1) as u8;
    u32::from(capacity_at_depth(k, depth)).max(u32::from(min_width))
}

fn capacity_at_depth(k: u16, depth: u8) -> u16 {
    assert!(depth <= 60, "depth must be <= 60");
    if depth <= 30 {
        return scaled_capacity(k, depth);
    }
    // Split deep levels in two so the intermediate products stay in u64.
    let half = depth / 2;
    let rest = depth - half;
    let tmp = scaled_capacity(k, half);
    scaled_capacity(tmp, rest)
}

/// Computes `round(k * (2/3)^depth)` in exact integer arithmetic.
fn scaled_capacity(k: u16, depth: u8) -> u16 {
    let two_k = (k as u64) << 1;
    let tmp = (two_k << depth) / POWERS_OF_THREE[depth as usize];
    let result = (tmp + 1) >> 1;
    debug_assert!(result <= k as u64, "capacity result exceeds k");
    result as u16
}

/// Total stream weight represented by levels of the given sizes.
///
/// An item at level `i` carries weight `2^i`; the sum over all retained
/// items must equal `n` at all times.
pub(super) fn weighted_item_count(level_sizes: &[usize]) -> u64 {
    level_sizes
        .iter()
        .enumerate()
        .map(|(level, &size)| (size as u64) << level)
        .sum()
}
