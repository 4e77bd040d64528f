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

//! A KLL streaming quantiles sketch.
//!
//! This crate implements the KLL sketch, a compact probabilistic summary of
//! an unbounded stream of comparable values. It answers approximate rank,
//! quantile, PMF, and CDF queries with provable error bounds, merges with
//! other sketches built over independent streams, and serializes to the
//! Apache DataSketches binary format, so sketches interoperate with the
//! Java, C++, and Python implementations byte for byte.
//!
//! # Usage
//!
//! ```rust
//! # use kll_sketch::KllSketch;
//! let mut sketch = KllSketch::<f64>::default();
//! for i in 1..=1000 {
//!     sketch.update(i as f64).unwrap();
//! }
//! let median = sketch.quantile(0.5, true).unwrap().unwrap();
//! assert!(median > 400.0 && median < 600.0);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod codec;
pub mod common;
pub mod error;
pub mod kll;

pub use self::common::random::RandomSource;
pub use self::common::random::XorShift64;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::kll::DEFAULT_K;
pub use self::kll::KllSketch;
pub use self::kll::MAX_K;
pub use self::kll::MIN_K;
pub use self::kll::SortedView;
pub use self::kll::SortedViewIter;
pub use self::kll::normalized_rank_error;
