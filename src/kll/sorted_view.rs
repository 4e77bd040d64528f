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

use super::value::KllValue;
use crate::error::Error;

/// A weight-sorted snapshot of the retained items of a sketch.
///
/// Entries are ordered ascending by item; each carries the weight implied
/// by the level it was retained at. The view is the basis of all rank and
/// quantile queries and the public (item, weight) iteration.
#[allow(private_bounds)]
#[derive(Debug, Clone)]
pub struct SortedView<T: KllValue> {
    entries: Vec<Entry<T>>,
    total_weight: u64,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    item: T,
    weight: u64,
    // Weight of this entry plus everything before it.
    cum_weight: u64,
}

#[allow(private_bounds)]
impl<T: KllValue> SortedView<T> {
    pub(super) fn from_levels(levels: &[Vec<T>]) -> Self {
        let num_retained: usize = levels.iter().map(|level| level.len()).sum();
        let mut entries = Vec::with_capacity(num_retained);

        for (level_idx, level) in levels.iter().enumerate() {
            let weight = 1u64 << level_idx;
            for item in level {
                entries.push(Entry {
                    item: item.clone(),
                    weight,
                    cum_weight: 0,
                });
            }
        }

        entries.sort_by(|a, b| T::compare(&a.item, &b.item));
        let mut total_weight = 0u64;
        for entry in &mut entries {
            total_weight += entry.weight;
            entry.cum_weight = total_weight;
        }

        Self {
            entries,
            total_weight,
        }
    }

    /// Number of entries in the view.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the view holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the weights of all entries, equal to the stream length `n`.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Iterates over `(item, weight)` pairs in ascending item order.
    ///
    /// The iterator is lazy and restartable; call `iter` again for a fresh
    /// pass.
    pub fn iter(&self) -> SortedViewIter<'_, T> {
        SortedViewIter {
            entries: self.entries.iter(),
        }
    }

    pub(super) fn rank(&self, item: &T, inclusive: bool) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }

        let idx = if inclusive {
            self.partition_point(|entry| T::compare(&entry.item, item) != Ordering::Greater)
        } else {
            self.partition_point(|entry| T::compare(&entry.item, item) == Ordering::Less)
        };

        if idx == 0 {
            return 0.0;
        }
        self.entries[idx - 1].cum_weight as f64 / self.total_weight as f64
    }

    /// Smallest item whose cumulative weight reaches `rank * n`.
    ///
    /// The caller guarantees a non-empty view and `rank` in `[0, 1]`.
    pub(super) fn quantile(&self, rank: f64, inclusive: bool) -> T {
        let target = if inclusive {
            (rank * self.total_weight as f64).ceil() as u64
        } else {
            (rank * self.total_weight as f64) as u64
        };

        let idx = if inclusive {
            self.partition_point(|entry| entry.cum_weight < target)
        } else {
            self.partition_point(|entry| entry.cum_weight <= target)
        };

        if idx >= self.entries.len() {
            return self.entries[self.entries.len() - 1].item.clone();
        }
        self.entries[idx].item.clone()
    }

    pub(super) fn cdf(&self, split_points: &[T], inclusive: bool) -> Vec<f64> {
        let mut ranks = Vec::with_capacity(split_points.len() + 1);
        for item in split_points {
            ranks.push(self.rank(item, inclusive));
        }
        ranks.push(1.0);
        ranks
    }

    pub(super) fn pmf(&self, split_points: &[T], inclusive: bool) -> Vec<f64> {
        let mut buckets = self.cdf(split_points, inclusive);
        for i in (1..buckets.len()).rev() {
            buckets[i] -= buckets[i - 1];
        }
        buckets
    }

    fn partition_point(&self, pred: impl Fn(&Entry<T>) -> bool) -> usize {
        self.entries.partition_point(pred)
    }
}

impl<'a, T: KllValue> IntoIterator for &'a SortedView<T> {
    type Item = (&'a T, u64);
    type IntoIter = SortedViewIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the `(item, weight)` pairs of a [`SortedView`].
#[derive(Debug, Clone)]
pub struct SortedViewIter<'a, T> {
    entries: std::slice::Iter<'a, Entry<T>>,
}

impl<'a, T> Iterator for SortedViewIter<'a, T> {
    type Item = (&'a T, u64);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| (&entry.item, entry.weight))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<T> ExactSizeIterator for SortedViewIter<'_, T> {}

/// Validates that split points are unique, strictly increasing, and
/// orderable.
pub(super) fn check_split_points<T: KllValue>(split_points: &[T]) -> Result<(), Error> {
    for (i, item) in split_points.iter().enumerate() {
        if T::is_nan(item) {
            return Err(Error::invalid_input("split points must not contain NaN values"));
        }
        if i + 1 < split_points.len()
            && T::compare(item, &split_points[i + 1]) != Ordering::Less
        {
            return Err(Error::invalid_input(
                "split points must be unique and monotonically increasing",
            ));
        }
    }
    Ok(())
}
