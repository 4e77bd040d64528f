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

//! Binary format constants for KLL sketches.
//!
//! The layout is the Apache DataSketches KLL format (Java
//! `KllPreambleUtil`, C++ `kll_sketch`). All multi-byte fields are
//! little-endian.
//!
//! Preamble (8 bytes):
//!
//! ```text
//! byte 0: preamble ints (2 for empty/single-item, 5 otherwise)
//! byte 1: serial version (1 for empty/full, 2 for single-item)
//! byte 2: family id (15)
//! byte 3: flags (empty | level-zero-sorted | single-item)
//! bytes 4-5: k
//! byte 6: m (minimum level width)
//! byte 7: unused
//! ```
//!
//! A full sketch continues with `n` (u64), `min_k` (u16), the number of
//! levels (u8), one unused byte, the capacity-relative levels offset array
//! (u32 per level), the encoded min and max items, and the item payloads
//! level by level. A single-item sketch continues directly with the one
//! encoded item.

/// Family id assigned to KLL in the DataSketches format.
pub(super) const FAMILY_KLL: u8 = 15;

/// Serial version for empty and full sketches.
pub(super) const SERIAL_VERSION_EMPTY_FULL: u8 = 1;
/// Serial version for single-item sketches.
pub(super) const SERIAL_VERSION_SINGLE: u8 = 2;

/// Preamble size in ints for empty and single-item sketches.
pub(super) const PREAMBLE_INTS_EMPTY_SINGLE: u8 = 2;
/// Preamble size in ints for sketches with more than one item.
pub(super) const PREAMBLE_INTS_FULL: u8 = 5;

/// Flag bit: the sketch is empty.
pub(super) const FLAG_IS_EMPTY: u8 = 1 << 0;
/// Flag bit: level zero is sorted.
pub(super) const FLAG_LEVEL_ZERO_SORTED: u8 = 1 << 1;
/// Flag bit: the sketch holds exactly one item.
pub(super) const FLAG_SINGLE_ITEM: u8 = 1 << 2;

/// Serialized size of an empty sketch.
pub(super) const EMPTY_SIZE_BYTES: usize = 8;
/// Offset of the item payload in the single-item form.
pub(super) const DATA_START_SINGLE_ITEM: usize = 8;
/// Offset of the levels array in the full form.
pub(super) const DATA_START: usize = 20;
