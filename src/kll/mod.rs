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

//! KLL sketch for estimating quantiles and ranks over a stream.
//!
//! The sketch keeps a small sample of the stream organized in levels, where
//! an item retained at level `i` stands for `2^i` original items. When a
//! level overflows its capacity it is compacted: the level is halved with a
//! single random coin deciding which alternating half survives, and the
//! survivors are promoted one level up at double weight. This keeps the
//! retained set at `O(k log(n/k))` items while preserving rank estimates
//! within a provable error bound.
//!
//! Serialization uses the Apache DataSketches KLL binary format, so bytes
//! produced here deserialize in the Java, C++, and Python implementations
//! and vice versa.
//!
//! # Usage
//!
//! ```rust
//! # use kll_sketch::kll::KllSketch;
//! let mut sketch = KllSketch::<f64>::new(200).unwrap();
//! sketch.update(1.0).unwrap();
//! sketch.update(2.0).unwrap();
//! let q = sketch.quantile(0.5, true).unwrap().unwrap();
//! assert!((1.0..=2.0).contains(&q));
//! ```

mod helper;
mod serialization;
mod sketch;
mod sorted_view;
mod value;

pub use self::sketch::KllSketch;
pub use self::sketch::normalized_rank_error;
pub use self::sorted_view::SortedView;
pub use self::sorted_view::SortedViewIter;

/// Default value of parameter k.
pub const DEFAULT_K: u16 = 200;
/// Minimum width of a level (parameter m in the DataSketches format).
pub const DEFAULT_M: u8 = 8;
/// Minimum value of parameter k.
pub const MIN_K: u16 = DEFAULT_M as u16;
/// Maximum value of parameter k.
pub const MAX_K: u16 = u16::MAX;
