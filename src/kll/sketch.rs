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

use std::cmp::Ordering;
use std::fmt;

use super::DEFAULT_K;
use super::DEFAULT_M;
use super::MAX_K;
use super::MIN_K;
use super::helper::level_capacity;
use super::helper::total_capacity;
use super::helper::weighted_item_count;
use super::serialization::DATA_START;
use super::serialization::DATA_START_SINGLE_ITEM;
use super::serialization::EMPTY_SIZE_BYTES;
use super::serialization::FAMILY_KLL;
use super::serialization::FLAG_IS_EMPTY;
use super::serialization::FLAG_LEVEL_ZERO_SORTED;
use super::serialization::FLAG_SINGLE_ITEM;
use super::serialization::PREAMBLE_INTS_EMPTY_SINGLE;
use super::serialization::PREAMBLE_INTS_FULL;
use super::serialization::SERIAL_VERSION_EMPTY_FULL;
use super::serialization::SERIAL_VERSION_SINGLE;
use super::sorted_view::SortedView;
use super::sorted_view::check_split_points;
use super::value::KllValue;
use crate::codec::ByteReader;
use crate::codec::ByteWriter;
use crate::common::random::RandomSource;
use crate::common::random::XorShift64;
use crate::error::Error;

/// KLL sketch for estimating quantiles and ranks.
///
/// See the [kll module level documentation](crate::kll) for more.
///
/// The type parameter `R` is the source of the compaction coin flips. It
/// defaults to [`XorShift64`]; tests that need a reproducible compaction
/// history construct the sketch with [`KllSketch::with_seed`].
#[allow(private_bounds)]
#[derive(Debug, Clone)]
pub struct KllSketch<T: KllValue, R: RandomSource = XorShift64> {
    k: u16,
    min_k: u16,
    n: u64,
    is_level_zero_sorted: bool,
    levels: Vec<Vec<T>>,
    min_item: Option<T>,
    max_item: Option<T>,
    rng: R,
}

#[allow(private_bounds)]
impl<T: KllValue> KllSketch<T> {
    /// Creates a new sketch with the given value of k.
    ///
    /// Returns an error unless k is in `[MIN_K, MAX_K]`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use kll_sketch::KllSketch;
    /// let sketch = KllSketch::<f64>::new(200).unwrap();
    /// assert_eq!(sketch.k(), 200);
    /// ```
    pub fn new(k: u16) -> Result<Self, Error> {
        Self::with_random_source(k, XorShift64::default())
    }

    /// Creates a new sketch with a fixed random seed.
    ///
    /// Two sketches built with the same seed and the same update sequence
    /// are byte-identical after serialization.
    pub fn with_seed(k: u16, seed: u64) -> Result<Self, Error> {
        Self::with_random_source(k, XorShift64::seeded(seed))
    }

    /// Deserializes a sketch from bytes.
    ///
    /// Fails with [`crate::ErrorKind::MalformedData`] on truncated input,
    /// an unknown family or version, or internally inconsistent counts.
    /// Never returns a partially built sketch.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_random_source(bytes, XorShift64::default())
    }
}

impl<T: KllValue> Default for KllSketch<T> {
    fn default() -> Self {
        Self::new(DEFAULT_K).expect("DEFAULT_K is a valid k")
    }
}

#[allow(private_bounds)]
impl<T: KllValue, R: RandomSource> KllSketch<T, R> {
    /// Creates a new sketch with the given value of k and an explicit
    /// random source for compaction coin flips.
    pub fn with_random_source(k: u16, rng: R) -> Result<Self, Error> {
        if !(MIN_K..=MAX_K).contains(&k) {
            return Err(Error::invalid_input(format!(
                "k must be in [{MIN_K}, {MAX_K}], got {k}"
            )));
        }
        Ok(Self::assemble(k, k, 0, vec![Vec::new()], None, None, false, rng))
    }

    /// Returns parameter k used to configure this sketch.
    pub fn k(&self) -> u16 {
        self.k
    }

    /// Returns the smallest k that has contributed to this sketch.
    ///
    /// Merging a sketch built with a lower k coarsens the error bound; this
    /// tracks the k that governs it.
    pub fn min_k(&self) -> u16 {
        self.min_k
    }

    /// Returns total weight of the stream.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Returns true if the sketch has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Returns the number of retained items.
    pub fn num_retained(&self) -> usize {
        self.levels.iter().map(|level| level.len()).sum()
    }

    /// Returns true once the retained items no longer represent the stream
    /// exactly, i.e. after the first compaction.
    pub fn is_estimation_mode(&self) -> bool {
        self.levels.len() > 1
    }

    /// Returns the minimum item seen by the sketch, or `None` if empty.
    pub fn min_item(&self) -> Option<&T> {
        self.min_item.as_ref()
    }

    /// Returns the maximum item seen by the sketch, or `None` if empty.
    pub fn max_item(&self) -> Option<&T> {
        self.max_item.as_ref()
    }

    /// Updates the sketch with a new item.
    ///
    /// Returns [`crate::ErrorKind::InvalidInput`] for NaN items, which
    /// cannot be ordered; the sketch is unchanged in that case.
    pub fn update(&mut self, item: T) -> Result<(), Error> {
        if T::is_nan(&item) {
            return Err(Error::invalid_input("cannot update sketch with a NaN item"));
        }
        self.update_min_max(&item);
        self.internal_update(item);
        Ok(())
    }

    /// Updates the sketch with every item of the iterator.
    ///
    /// Stops at the first invalid item; items consumed before it remain
    /// committed.
    pub fn update_many<I>(&mut self, items: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.update(item)?;
        }
        Ok(())
    }

    /// Merges another sketch into this one.
    ///
    /// The result is equivalent to a sketch that observed the concatenation
    /// of both streams. The operand is not mutated. Merging sketches with
    /// different k keeps this sketch's level structure but adopts the
    /// smaller `min_k` for error reporting.
    pub fn merge<R2: RandomSource>(&mut self, other: &KllSketch<T, R2>) {
        if other.is_empty() {
            return;
        }

        self.update_min_max_from_other(other);

        let final_n = self.n + other.n;
        for item in &other.levels[0] {
            self.internal_update(item.clone());
        }

        if other.levels.len() >= 2 {
            self.merge_higher_levels(other);
        }

        self.n = final_n;
        if other.is_estimation_mode() {
            self.min_k = self.min_k.min(other.min_k);
        }

        debug_assert_eq!(self.weighted_count(), self.n, "total weight does not match n");
    }

    /// Returns the normalized rank of the given item, or `None` if the
    /// sketch is empty.
    pub fn rank(&self, item: &T, inclusive: bool) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.sorted_view().rank(item, inclusive))
    }

    /// Returns the quantile for the given normalized rank.
    ///
    /// Returns [`crate::ErrorKind::InvalidInput`] unless rank is in
    /// `[0.0, 1.0]`, and `Ok(None)` if the sketch is empty.
    pub fn quantile(&self, rank: f64, inclusive: bool) -> Result<Option<T>, Error> {
        check_rank(rank)?;
        if self.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.sorted_view().quantile(rank, inclusive)))
    }

    /// Returns the quantiles for all given normalized ranks.
    ///
    /// An empty sketch yields an empty Vec.
    pub fn quantiles(&self, ranks: &[f64], inclusive: bool) -> Result<Vec<T>, Error> {
        for &rank in ranks {
            check_rank(rank)?;
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let view = self.sorted_view();
        Ok(ranks
            .iter()
            .map(|&rank| view.quantile(rank, inclusive))
            .collect())
    }

    /// Returns the approximate CDF at the given split points, plus a final
    /// entry of 1.0.
    ///
    /// Split points must be unique, strictly increasing, and not NaN. An
    /// empty sketch yields an empty Vec.
    pub fn cdf(&self, split_points: &[T], inclusive: bool) -> Result<Vec<f64>, Error> {
        check_split_points(split_points)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.sorted_view().cdf(split_points, inclusive))
    }

    /// Returns the approximate PMF over the intervals induced by the given
    /// split points.
    ///
    /// Split points must be unique, strictly increasing, and not NaN. An
    /// empty sketch yields an empty Vec.
    pub fn pmf(&self, split_points: &[T], inclusive: bool) -> Result<Vec<f64>, Error> {
        check_split_points(split_points)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.sorted_view().pmf(split_points, inclusive))
    }

    /// Returns the normalized rank error bound of this sketch.
    ///
    /// With `pmf` true the bound is the two-sided "double-sided" bound
    /// applicable to PMF buckets, otherwise the one-sided single-quantile
    /// bound.
    pub fn normalized_rank_error(&self, pmf: bool) -> f64 {
        normalized_rank_error(self.min_k, pmf)
    }

    /// Builds a weight-sorted view of the retained items.
    ///
    /// The view snapshots the current state; it is the basis for custom
    /// aggregations over `(item, weight)` pairs in ascending item order.
    pub fn sorted_view(&self) -> SortedView<T> {
        SortedView::from_levels(&self.levels)
    }

    /// Produces a human-readable summary of the sketch.
    ///
    /// Diagnostic only; the output is not covered by any compatibility
    /// guarantee.
    pub fn to_string(&self, print_levels: bool, print_items: bool) -> String
    where
        T: fmt::Display,
    {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "### KLL sketch summary:");
        let _ = writeln!(out, "   K              : {}", self.k);
        let _ = writeln!(out, "   min K          : {}", self.min_k);
        let _ = writeln!(out, "   M              : {}", DEFAULT_M);
        let _ = writeln!(out, "   N              : {}", self.n);
        let _ = writeln!(
            out,
            "   Epsilon        : {:.3}%",
            self.normalized_rank_error(false) * 100.0
        );
        let _ = writeln!(
            out,
            "   Epsilon PMF    : {:.3}%",
            self.normalized_rank_error(true) * 100.0
        );
        let _ = writeln!(out, "   Empty          : {}", self.is_empty());
        let _ = writeln!(out, "   Estimation mode: {}", self.is_estimation_mode());
        let _ = writeln!(out, "   Levels         : {}", self.levels.len());
        let _ = writeln!(out, "   Sorted         : {}", self.is_level_zero_sorted);
        let _ = writeln!(out, "   Capacity items : {}", self.capacity());
        let _ = writeln!(out, "   Retained items : {}", self.num_retained());
        if let (Some(min), Some(max)) = (&self.min_item, &self.max_item) {
            let _ = writeln!(out, "   Min item       : {min}");
            let _ = writeln!(out, "   Max item       : {max}");
        }
        let _ = writeln!(out, "### End sketch summary");

        if print_levels {
            let _ = writeln!(out, "### KLL sketch levels:");
            let _ = writeln!(out, "   index: items in use, capacity");
            for (idx, level) in self.levels.iter().enumerate() {
                let cap = level_capacity(self.k, self.levels.len(), idx, DEFAULT_M);
                let _ = writeln!(out, "   {idx}: {}, {cap}", level.len());
            }
            let _ = writeln!(out, "### End sketch levels");
        }

        if print_items {
            let _ = writeln!(out, "### KLL sketch data:");
            for (idx, level) in self.levels.iter().enumerate() {
                let _ = writeln!(out, " level {idx}:");
                for item in level {
                    let _ = writeln!(out, "   {item}");
                }
            }
            let _ = writeln!(out, "### End sketch data");
        }

        out
    }

    /// Serializes the sketch to the DataSketches KLL binary format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(self.serialized_size());

        let is_empty = self.is_empty();
        let is_single_item = self.n == 1;

        let preamble_ints = if is_empty || is_single_item {
            PREAMBLE_INTS_EMPTY_SINGLE
        } else {
            PREAMBLE_INTS_FULL
        };
        let serial_version = if is_single_item {
            SERIAL_VERSION_SINGLE
        } else {
            SERIAL_VERSION_EMPTY_FULL
        };

        let mut flags = 0u8;
        if is_empty {
            flags |= FLAG_IS_EMPTY;
        }
        if self.is_level_zero_sorted {
            flags |= FLAG_LEVEL_ZERO_SORTED;
        }
        if is_single_item {
            flags |= FLAG_SINGLE_ITEM;
        }

        out.write_u8(preamble_ints);
        out.write_u8(serial_version);
        out.write_u8(FAMILY_KLL);
        out.write_u8(flags);
        out.write_u16(self.k);
        out.write_u8(DEFAULT_M);
        out.write_u8(0);

        if is_empty {
            return out.into_bytes();
        }

        if !is_single_item {
            out.write_u64(self.n);
            out.write_u16(self.min_k);
            out.write_u8(self.levels.len() as u8);
            out.write_u8(0);

            let offsets = self.level_offsets();
            for offset in offsets.iter().take(self.levels.len()) {
                out.write_u32(*offset);
            }

            if let Some(min_item) = &self.min_item {
                T::encode(min_item, &mut out);
            }
            if let Some(max_item) = &self.max_item {
                T::encode(max_item, &mut out);
            }
        }

        for level in &self.levels {
            for item in level {
                T::encode(item, &mut out);
            }
        }

        out.into_bytes()
    }

    /// Deserializes a sketch from bytes with an explicit random source for
    /// subsequent compactions.
    pub fn deserialize_with_random_source(bytes: &[u8], rng: R) -> Result<Self, Error> {
        let mut input = ByteReader::new(bytes);

        let preamble_ints = input
            .read_u8()
            .map_err(|e| Error::truncated("preamble ints").set_source(e))?;
        let serial_version = input
            .read_u8()
            .map_err(|e| Error::truncated("serial version").set_source(e))?;
        let family_id = input
            .read_u8()
            .map_err(|e| Error::truncated("family id").set_source(e))?;
        let flags = input
            .read_u8()
            .map_err(|e| Error::truncated("flags").set_source(e))?;
        let k = input
            .read_u16()
            .map_err(|e| Error::truncated("k").set_source(e))?;
        let m = input
            .read_u8()
            .map_err(|e| Error::truncated("m").set_source(e))?;
        let _unused = input
            .read_u8()
            .map_err(|e| Error::truncated("unused byte").set_source(e))?;

        if family_id != FAMILY_KLL {
            return Err(Error::malformed("invalid family id")
                .with_context("expected", FAMILY_KLL)
                .with_context("actual", family_id));
        }
        if serial_version != SERIAL_VERSION_EMPTY_FULL && serial_version != SERIAL_VERSION_SINGLE {
            return Err(
                Error::malformed("unsupported serial version")
                    .with_context("version", serial_version),
            );
        }
        if m != DEFAULT_M {
            return Err(Error::malformed("invalid m")
                .with_context("expected", DEFAULT_M)
                .with_context("actual", m));
        }
        if !(MIN_K..=MAX_K).contains(&k) {
            return Err(Error::malformed("k out of range").with_context("k", k));
        }

        let is_empty = (flags & FLAG_IS_EMPTY) != 0;
        let is_single_item = (flags & FLAG_SINGLE_ITEM) != 0;
        let is_level_zero_sorted = (flags & FLAG_LEVEL_ZERO_SORTED) != 0;

        let expected_preamble_ints = if is_empty || is_single_item {
            PREAMBLE_INTS_EMPTY_SINGLE
        } else {
            PREAMBLE_INTS_FULL
        };
        if preamble_ints != expected_preamble_ints {
            return Err(Error::malformed("invalid preamble ints")
                .with_context("expected", expected_preamble_ints)
                .with_context("actual", preamble_ints));
        }

        if is_empty {
            return Ok(Self::assemble(
                k,
                k,
                0,
                vec![Vec::new()],
                None,
                None,
                is_level_zero_sorted,
                rng,
            ));
        }

        let (n, min_k, num_levels) = if is_single_item {
            (1u64, k, 1usize)
        } else {
            let n = input
                .read_u64()
                .map_err(|e| Error::truncated("n").set_source(e))?;
            let min_k = input
                .read_u16()
                .map_err(|e| Error::truncated("min_k").set_source(e))?;
            let num_levels = input
                .read_u8()
                .map_err(|e| Error::truncated("num levels").set_source(e))?;
            let _unused = input
                .read_u8()
                .map_err(|e| Error::truncated("unused byte").set_source(e))?;
            (n, min_k, num_levels as usize)
        };

        // 61 levels already cover any n representable in u64; more than that
        // cannot come from a conforming serializer and would overflow the
        // capacity schedule.
        if num_levels == 0 || num_levels > 61 {
            return Err(
                Error::malformed("number of levels out of range")
                    .with_context("num_levels", num_levels),
            );
        }
        if min_k < MIN_K || min_k > k {
            return Err(Error::malformed("min_k out of range")
                .with_context("min_k", min_k)
                .with_context("k", k));
        }

        let capacity = total_capacity(k, m, num_levels);
        let mut offsets = Vec::with_capacity(num_levels + 1);
        if is_single_item {
            offsets.push(capacity - 1);
        } else {
            for _ in 0..num_levels {
                let offset = input
                    .read_u32()
                    .map_err(|e| Error::truncated("levels array").set_source(e))?;
                offsets.push(offset);
            }
        }
        offsets.push(capacity);

        if offsets[0] > capacity {
            return Err(Error::malformed("levels array exceeds capacity"));
        }
        for window in offsets.windows(2) {
            if window[1] < window[0] {
                return Err(Error::malformed("levels array must be non-decreasing"));
            }
        }

        let level_sizes: Vec<usize> = offsets
            .windows(2)
            .map(|window| (window[1] - window[0]) as usize)
            .collect();
        if weighted_item_count(&level_sizes) != n {
            return Err(Error::malformed("level populations do not sum to n")
                .with_context("n", n));
        }

        let (min_item, max_item) = if is_single_item {
            (None, None)
        } else {
            (Some(T::decode(&mut input)?), Some(T::decode(&mut input)?))
        };

        let mut levels = Vec::with_capacity(num_levels);
        for size in level_sizes {
            let mut items = Vec::with_capacity(size);
            for _ in 0..size {
                items.push(T::decode(&mut input)?);
            }
            levels.push(items);
        }

        let mut sketch = Self::assemble(
            k,
            min_k,
            n,
            levels,
            min_item,
            max_item,
            is_level_zero_sorted,
            rng,
        );

        if is_single_item {
            let item = sketch.levels[0].first().cloned();
            sketch.min_item = item.clone();
            sketch.max_item = item;
        }

        Ok(sketch)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        k: u16,
        min_k: u16,
        n: u64,
        levels: Vec<Vec<T>>,
        min_item: Option<T>,
        max_item: Option<T>,
        is_level_zero_sorted: bool,
        rng: R,
    ) -> Self {
        Self {
            k,
            min_k,
            n,
            is_level_zero_sorted,
            levels,
            min_item,
            max_item,
            rng,
        }
    }

    fn capacity(&self) -> usize {
        total_capacity(self.k, DEFAULT_M, self.levels.len()) as usize
    }

    /// Offsets of each level within the serialized capacity-sized region.
    ///
    /// Items pack toward the end of the region, so the first offset is
    /// `capacity - retained` and the last equals the capacity.
    fn level_offsets(&self) -> Vec<u32> {
        let capacity = self.capacity() as u32;
        let retained = self.num_retained() as u32;
        assert!(capacity >= retained, "capacity must be >= retained");

        let mut offsets = Vec::with_capacity(self.levels.len() + 1);
        let mut offset = capacity - retained;
        offsets.push(offset);
        for level in &self.levels {
            offset += level.len() as u32;
            offsets.push(offset);
        }
        offsets
    }

    fn serialized_size(&self) -> usize {
        if self.is_empty() {
            return EMPTY_SIZE_BYTES;
        }
        if self.n == 1 {
            let item = &self.levels[0][0];
            return DATA_START_SINGLE_ITEM + T::encoded_size(item);
        }

        let mut size = DATA_START + self.levels.len() * 4;
        if let Some(min_item) = &self.min_item {
            size += T::encoded_size(min_item);
        }
        if let Some(max_item) = &self.max_item {
            size += T::encoded_size(max_item);
        }
        for level in &self.levels {
            for item in level {
                size += T::encoded_size(item);
            }
        }
        size
    }

    fn update_min_max(&mut self, item: &T) {
        match self.min_item.as_ref() {
            None => {
                self.min_item = Some(item.clone());
                self.max_item = Some(item.clone());
            }
            Some(min) => {
                if T::compare(item, min) == Ordering::Less {
                    self.min_item = Some(item.clone());
                }
                if let Some(max) = &self.max_item {
                    if T::compare(max, item) == Ordering::Less {
                        self.max_item = Some(item.clone());
                    }
                }
            }
        }
    }

    fn update_min_max_from_other<R2: RandomSource>(&mut self, other: &KllSketch<T, R2>) {
        match (&self.min_item, &self.max_item) {
            (None, None) => {
                self.min_item = other.min_item.clone();
                self.max_item = other.max_item.clone();
            }
            (Some(min), Some(max)) => {
                if let Some(other_min) = &other.min_item {
                    if T::compare(other_min, min) == Ordering::Less {
                        self.min_item = Some(other_min.clone());
                    }
                }
                if let Some(other_max) = &other.max_item {
                    if T::compare(max, other_max) == Ordering::Less {
                        self.max_item = Some(other_max.clone());
                    }
                }
            }
            _ => {
                self.min_item = other.min_item.clone();
                self.max_item = other.max_item.clone();
            }
        }
    }

    fn internal_update(&mut self, item: T) {
        if self.num_retained() >= self.capacity() {
            self.compact_for_update();
        }
        self.n += 1;
        self.is_level_zero_sorted = false;
        self.levels[0].insert(0, item);
    }

    /// Compacts the shallowest over-full level, promoting half of its items
    /// one level up.
    fn compact_for_update(&mut self) {
        let level = self.level_to_compact();
        if level + 1 == self.levels.len() {
            self.levels.push(Vec::new());
        }

        let mut current = std::mem::take(&mut self.levels[level]);
        let mut above = std::mem::take(&mut self.levels[level + 1]);

        // Set one item aside when the population is odd so the rest pairs up.
        let mut leftover = None;
        if current.len() % 2 == 1 {
            leftover = Some(current.remove(0));
        }

        if level == 0 && !self.is_level_zero_sorted {
            current.sort_by(T::compare);
        }

        let use_up = above.is_empty();
        let promoted = select_alternating(current, self.rng.next_bool(), use_up);
        if above.is_empty() {
            above = promoted;
        } else {
            above = merge_sorted(promoted, above);
        }
        self.levels[level + 1] = above;

        let mut remaining = Vec::new();
        if let Some(item) = leftover {
            remaining.push(item);
        }
        self.levels[level] = remaining;
    }

    fn level_to_compact(&self) -> usize {
        let num_levels = self.levels.len();
        for level in 0..num_levels {
            let population = self.levels[level].len() as u32;
            if population >= level_capacity(self.k, num_levels, level, DEFAULT_M) {
                return level;
            }
        }
        panic!("no level to compact");
    }

    fn merge_higher_levels<R2: RandomSource>(&mut self, other: &KllSketch<T, R2>) {
        let provisional_levels = self.levels.len().max(other.levels.len());
        let mut self_levels = std::mem::take(&mut self.levels);
        let mut work_levels = vec![Vec::new(); provisional_levels];
        work_levels[0] = std::mem::take(&mut self_levels[0]);

        for level in 1..provisional_levels {
            let left = if level < self_levels.len() {
                std::mem::take(&mut self_levels[level])
            } else {
                Vec::new()
            };
            let right = other.levels.get(level).cloned().unwrap_or_default();

            work_levels[level] = if left.is_empty() {
                right
            } else if right.is_empty() {
                left
            } else {
                merge_sorted(left, right)
            };
        }

        self.levels = self.compress_levels(work_levels);
    }

    /// Compacts a provisional level structure until every level fits its
    /// capacity, growing the structure as promotions reach the top.
    fn compress_levels(&mut self, mut levels_in: Vec<Vec<T>>) -> Vec<Vec<T>> {
        let mut current_num_levels = levels_in.len();
        let mut current_item_count: usize = levels_in.iter().map(|level| level.len()).sum();
        let mut target_item_count =
            total_capacity(self.k, DEFAULT_M, current_num_levels) as usize;
        let mut levels_out = Vec::with_capacity(current_num_levels + 1);

        let mut current_level = 0usize;
        while current_level < current_num_levels {
            if current_level + 1 >= levels_in.len() {
                levels_in.push(Vec::new());
            }

            let raw_population = levels_in[current_level].len();
            let cap =
                level_capacity(self.k, current_num_levels, current_level, DEFAULT_M) as usize;

            if current_item_count < target_item_count || raw_population < cap {
                levels_out.push(std::mem::take(&mut levels_in[current_level]));
            } else {
                let mut current = std::mem::take(&mut levels_in[current_level]);
                let mut above = std::mem::take(&mut levels_in[current_level + 1]);

                let mut leftover = None;
                if current.len() % 2 == 1 {
                    leftover = Some(current.remove(0));
                }

                if current_level == 0 && !self.is_level_zero_sorted {
                    current.sort_by(T::compare);
                }

                let use_up = above.is_empty();
                let promoted = select_alternating(current, self.rng.next_bool(), use_up);
                let promoted_len = promoted.len();
                if above.is_empty() {
                    above = promoted;
                } else {
                    above = merge_sorted(promoted, above);
                }
                levels_in[current_level + 1] = above;

                let mut out_level = Vec::new();
                if let Some(item) = leftover {
                    out_level.push(item);
                }
                levels_out.push(out_level);

                current_item_count = current_item_count.saturating_sub(promoted_len);

                if current_level == current_num_levels - 1 {
                    current_num_levels += 1;
                    target_item_count +=
                        level_capacity(self.k, current_num_levels, 0, DEFAULT_M) as usize;
                    if levels_in.len() < current_num_levels + 1 {
                        levels_in.resize_with(current_num_levels + 1, Vec::new);
                    }
                }
            }
            current_level += 1;
        }

        levels_out.truncate(current_num_levels);
        levels_out
    }

    fn weighted_count(&self) -> u64 {
        let sizes: Vec<usize> = self.levels.iter().map(|level| level.len()).collect();
        weighted_item_count(&sizes)
    }
}

impl<T: KllValue + PartialEq, R: RandomSource> PartialEq for KllSketch<T, R> {
    /// Compares logical sketch state; the random source is excluded.
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && self.min_k == other.min_k
            && self.n == other.n
            && self.is_level_zero_sorted == other.is_level_zero_sorted
            && self.levels == other.levels
            && self.min_item == other.min_item
            && self.max_item == other.max_item
    }
}

/// Returns the normalized rank error bound for the given k.
///
/// The fitted constants come from the canonical DataSketches calibration;
/// `pmf` selects the two-sided bound.
pub fn normalized_rank_error(k: u16, pmf: bool) -> f64 {
    let k = k as f64;
    if pmf {
        2.446 / k.powf(0.9433)
    } else {
        2.296 / k.powf(0.9723)
    }
}

/// Keeps every other item of a sorted, even-length level.
///
/// `coin` is the one random bit of the whole compaction; it shifts which of
/// the two alternating halves survives. `use_up` flips the parity so a
/// promotion into an empty level lands on the same side the reference
/// implementations choose.
fn select_alternating<T: KllValue>(items: Vec<T>, coin: bool, use_up: bool) -> Vec<T> {
    let len = items.len();
    debug_assert!(len % 2 == 0, "length must be even");
    let offset = coin as usize;
    let parity = if use_up { (len - 1 - offset) % 2 } else { offset };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| if idx % 2 == parity { Some(item) } else { None })
        .collect()
}

/// Merges two individually sorted vectors into one sorted vector.
fn merge_sorted<T: KllValue>(left: Vec<T>, right: Vec<T>) -> Vec<T> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left_iter = left.into_iter().peekable();
    let mut right_iter = right.into_iter().peekable();

    loop {
        match (left_iter.peek(), right_iter.peek()) {
            (Some(l), Some(r)) => {
                if T::compare(l, r) == Ordering::Less {
                    merged.extend(left_iter.next());
                } else {
                    merged.extend(right_iter.next());
                }
            }
            _ => break,
        }
    }
    merged.extend(left_iter);
    merged.extend(right_iter);
    merged
}

fn check_rank(rank: f64) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&rank) {
        return Err(Error::invalid_input(format!(
            "rank must be in [0.0, 1.0], got {rank}"
        )));
    }
    Ok(())
}
