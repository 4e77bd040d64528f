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

use googletest::assert_that;
use googletest::prelude::contains_substring;
use kll_sketch::DEFAULT_K;
use kll_sketch::ErrorKind;
use kll_sketch::KllSketch;
use kll_sketch::MAX_K;
use kll_sketch::MIN_K;
use kll_sketch::normalized_rank_error;

const NUMERIC_NOISE_TOLERANCE: f64 = 1e-6;

fn assert_approx_eq(actual: f64, expected: f64, tolerance: f64) {
    let delta = (actual - expected).abs();
    assert!(
        delta <= tolerance,
        "expected {expected} +/- {tolerance}, got {actual}"
    );
}

fn rank_eps(sketch: &KllSketch<f32>) -> f64 {
    sketch.normalized_rank_error(false)
}

#[test]
fn test_k_limits() {
    assert!(KllSketch::<f32>::new(MIN_K).is_ok());
    assert!(KllSketch::<f32>::new(MAX_K).is_ok());
}

#[test]
fn test_k_too_small_is_rejected() {
    let err = KllSketch::<f32>::new(MIN_K - 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_that!(err.message(), contains_substring("k must be in"));
}

#[test]
fn test_empty() {
    let sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    assert!(sketch.is_empty());
    assert!(!sketch.is_estimation_mode());
    assert_eq!(sketch.n(), 0);
    assert_eq!(sketch.num_retained(), 0);
    assert!(sketch.min_item().is_none());
    assert!(sketch.max_item().is_none());
    assert!(sketch.rank(&0.0, true).is_none());
    assert_eq!(sketch.quantile(0.5, true).unwrap(), None);
    assert_eq!(sketch.quantiles(&[0.5], true).unwrap(), Vec::<f32>::new());
    assert_eq!(sketch.pmf(&[0.0f32], true).unwrap(), Vec::<f64>::new());
    assert_eq!(sketch.cdf(&[0.0f32], true).unwrap(), Vec::<f64>::new());
    assert_eq!(sketch.sorted_view().iter().count(), 0);
}

#[test]
fn test_quantile_rank_out_of_range() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    sketch.update(0.0).unwrap();
    for bad_rank in [-1.0, 1.5, f64::NAN] {
        let err = sketch.quantile(bad_rank, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_that!(err.message(), contains_substring("rank must be in"));
    }
    let err = sketch.quantiles(&[0.5, 2.0], true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_nan_update_is_rejected() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    let err = sketch.update(f32::NAN).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_that!(err.message(), contains_substring("NaN"));
    assert!(sketch.is_empty());

    sketch.update(0.0).unwrap();
    assert!(sketch.update(f32::NAN).is_err());
    assert_eq!(sketch.n(), 1);
}

#[test]
fn test_one_item() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    sketch.update(1.0).unwrap();
    assert!(!sketch.is_empty());
    assert!(!sketch.is_estimation_mode());
    assert_eq!(sketch.n(), 1);
    assert_eq!(sketch.num_retained(), 1);
    assert_eq!(sketch.rank(&1.0, false), Some(0.0));
    assert_eq!(sketch.rank(&1.0, true), Some(1.0));
    assert_eq!(sketch.rank(&2.0, false), Some(1.0));
    assert_eq!(sketch.min_item().cloned(), Some(1.0));
    assert_eq!(sketch.max_item().cloned(), Some(1.0));
    assert_eq!(sketch.quantile(0.5, true).unwrap(), Some(1.0));
}

#[test]
fn test_update_many() {
    let mut sketch = KllSketch::<f64>::new(DEFAULT_K).unwrap();
    sketch.update_many((1..=100).map(f64::from)).unwrap();
    assert_eq!(sketch.n(), 100);
    assert_eq!(sketch.min_item().cloned(), Some(1.0));
    assert_eq!(sketch.max_item().cloned(), Some(100.0));

    // The batch stops at the first NaN; items before it stay committed.
    let err = sketch.update_many(vec![101.0, f64::NAN, 103.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(sketch.n(), 101);
}

#[test]
fn test_many_items_exact_mode() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    let n = DEFAULT_K as usize;
    for i in 1..=n {
        sketch.update(i as f32).unwrap();
        assert_eq!(sketch.n(), i as u64);
    }
    assert!(!sketch.is_empty());
    assert!(!sketch.is_estimation_mode());
    assert_eq!(sketch.num_retained(), n);
    assert_eq!(sketch.min_item().cloned(), Some(1.0));
    assert_eq!(sketch.quantile(0.0, true).unwrap(), Some(1.0));
    assert_eq!(sketch.max_item().cloned(), Some(n as f32));
    assert_eq!(sketch.quantile(1.0, true).unwrap(), Some(n as f32));

    for i in 1..=n {
        let inclusive_rank = i as f64 / n as f64;
        assert_eq!(sketch.rank(&(i as f32), true), Some(inclusive_rank));
        let exclusive_rank = (i - 1) as f64 / n as f64;
        assert_eq!(sketch.rank(&(i as f32), false), Some(exclusive_rank));
    }
}

#[test]
fn test_ten_items_quantiles() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    for i in 1..=10 {
        sketch.update(i as f32).unwrap();
    }
    assert_eq!(sketch.quantile(0.0, true).unwrap(), Some(1.0));
    assert_eq!(sketch.quantile(0.5, true).unwrap(), Some(5.0));
    assert_eq!(sketch.quantile(0.99, true).unwrap(), Some(10.0));
    assert_eq!(sketch.quantile(1.0, true).unwrap(), Some(10.0));

    let quantiles = sketch.quantiles(&[0.0, 0.5, 1.0], true).unwrap();
    assert_eq!(quantiles, vec![1.0, 5.0, 10.0]);
}

#[test]
fn test_hundred_items_quantiles() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    for i in 0..100 {
        sketch.update(i as f32).unwrap();
    }
    assert_eq!(sketch.quantile(0.0, true).unwrap(), Some(0.0));
    assert_eq!(sketch.quantile(0.01, true).unwrap(), Some(0.0));
    assert_eq!(sketch.quantile(0.5, true).unwrap(), Some(49.0));
    assert_eq!(sketch.quantile(0.99, true).unwrap(), Some(98.0));
    assert_eq!(sketch.quantile(1.0, true).unwrap(), Some(99.0));
}

#[test]
fn test_many_items_estimation_mode_rank_error() {
    let mut sketch = KllSketch::<f32>::with_seed(DEFAULT_K, 1).unwrap();
    let n = 10_000;
    for i in 0..n {
        sketch.update(i as f32).unwrap();
    }
    assert!(!sketch.is_empty());
    assert!(sketch.is_estimation_mode());
    assert_eq!(sketch.min_item().cloned(), Some(0.0));
    assert_eq!(sketch.max_item().cloned(), Some((n - 1) as f32));

    let rank_eps = rank_eps(&sketch);
    for i in (0..n).step_by(10) {
        let true_rank = i as f64 / n as f64;
        let rank = sketch.rank(&(i as f32), false).unwrap();
        assert_approx_eq(rank, true_rank, rank_eps);
    }

    assert!(sketch.num_retained() > 0);
    assert!(sketch.num_retained() < n as usize);
}

#[test]
fn test_rank_is_monotonic() {
    let mut sketch = KllSketch::<f64>::with_seed(DEFAULT_K, 2).unwrap();
    for i in 0..10_000 {
        sketch.update(((i * 7919) % 10_000) as f64).unwrap();
    }
    let mut previous = 0.0;
    for i in 0..100 {
        let rank = sketch.rank(&((i * 100) as f64), true).unwrap();
        assert!(rank >= previous, "rank decreased at {i}");
        previous = rank;
    }
}

#[test]
fn test_quantile_rank_inverse() {
    let mut sketch = KllSketch::<f32>::with_seed(DEFAULT_K, 3).unwrap();
    let n = 100_000;
    for i in 0..n {
        sketch.update(i as f32).unwrap();
    }
    let eps = rank_eps(&sketch);
    for rank in [0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99] {
        let quantile = sketch.quantile(rank, true).unwrap().unwrap();
        let round_trip = sketch.rank(&quantile, true).unwrap();
        assert_approx_eq(round_trip, rank, 2.0 * eps);
    }
}

#[test]
fn test_rank_cdf_pmf_consistency() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    let n = 200;
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        sketch.update(i as f32).unwrap();
        values.push(i as f32);
    }

    for inclusive in [false, true] {
        let ranks = sketch.cdf(&values, inclusive).unwrap();
        let pmf = sketch.pmf(&values, inclusive).unwrap();
        assert_eq!(ranks.len(), n + 1);
        assert_eq!(pmf.len(), n + 1);

        let mut subtotal = 0.0;
        for i in 0..n {
            let rank = sketch.rank(&values[i], inclusive).unwrap();
            assert_eq!(rank, ranks[i]);
            subtotal += pmf[i];
            assert!(
                (ranks[i] - subtotal).abs() <= NUMERIC_NOISE_TOLERANCE,
                "cdf vs pmf mismatch at index {i}"
            );
        }
        assert_eq!(*ranks.last().unwrap(), 1.0);
    }
}

#[test]
fn test_out_of_order_split_points_are_rejected() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    sketch.update(0.0).unwrap();
    let err = sketch.cdf(&[1.0, 0.0], true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_that!(
        err.message(),
        contains_substring("unique and monotonically increasing")
    );
    assert!(sketch.pmf(&[1.0, 1.0], true).is_err());
}

#[test]
fn test_nan_split_point_is_rejected() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    sketch.update(0.0).unwrap();
    let err = sketch.cdf(&[f32::NAN], true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_that!(err.message(), contains_substring("NaN"));
}

#[test]
fn test_iteration_conserves_weight_and_bounds() {
    let mut sketch = KllSketch::<f32>::with_seed(DEFAULT_K, 4).unwrap();
    let n = 100_000u64;
    for i in 0..n {
        sketch.update(i as f32).unwrap();
    }

    let view = sketch.sorted_view();
    let min = *sketch.min_item().unwrap();
    let max = *sketch.max_item().unwrap();
    let mut total_weight = 0u64;
    let mut previous: Option<f32> = None;
    for (item, weight) in view.iter() {
        assert!(*item >= min && *item <= max, "item {item} out of bounds");
        if let Some(prev) = previous {
            assert!(*item >= prev, "iteration not sorted");
        }
        previous = Some(*item);
        total_weight += weight;
    }
    assert_eq!(total_weight, sketch.n());
    assert_eq!(view.total_weight(), sketch.n());
}

#[test]
fn test_merge() {
    let mut sketch1 = KllSketch::<f32>::with_seed(DEFAULT_K, 5).unwrap();
    let mut sketch2 = KllSketch::<f32>::with_seed(DEFAULT_K, 6).unwrap();
    let n = 10_000;
    for i in 0..n {
        sketch1.update(i as f32).unwrap();
        sketch2.update((2 * n - i - 1) as f32).unwrap();
    }

    assert_eq!(sketch1.min_item().cloned(), Some(0.0));
    assert_eq!(sketch1.max_item().cloned(), Some((n - 1) as f32));
    assert_eq!(sketch2.min_item().cloned(), Some(n as f32));
    assert_eq!(sketch2.max_item().cloned(), Some((2 * n - 1) as f32));

    sketch1.merge(&sketch2);

    assert!(!sketch1.is_empty());
    assert_eq!(sketch1.n(), (2 * n) as u64);
    assert_eq!(sketch1.min_item().cloned(), Some(0.0));
    assert_eq!(sketch1.max_item().cloned(), Some((2 * n - 1) as f32));
    // The operand is untouched.
    assert_eq!(sketch2.n(), n as u64);
    let median = sketch1.quantile(0.5, true).unwrap().unwrap();
    let rank_eps = rank_eps(&sketch1);
    assert_approx_eq(median as f64, n as f64, n as f64 * rank_eps);
}

#[test]
fn test_merge_empty_is_noop() {
    let mut sketch1 = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    let mut sketch2 = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    for i in 0..1000 {
        sketch1.update(i as f32).unwrap();
    }
    let before = sketch1.clone();
    sketch1.merge(&sketch2);
    assert_eq!(sketch1, before);

    sketch2.merge(&before);
    assert_eq!(sketch2.n(), 1000);
}

#[test]
fn test_merge_lower_k() {
    let mut sketch1 = KllSketch::<f32>::with_seed(256, 7).unwrap();
    let mut sketch2 = KllSketch::<f32>::with_seed(128, 8).unwrap();
    let n = 10_000;
    for i in 0..n {
        sketch1.update(i as f32).unwrap();
        sketch2.update((2 * n - i - 1) as f32).unwrap();
    }

    sketch1.merge(&sketch2);

    assert_eq!(sketch1.n(), (2 * n) as u64);
    assert_eq!(sketch1.min_item().cloned(), Some(0.0));
    assert_eq!(sketch1.max_item().cloned(), Some((2 * n - 1) as f32));
    // The coarser accuracy dominates after the merge.
    assert_eq!(sketch1.min_k(), 128);
    assert_eq!(
        sketch1.normalized_rank_error(false),
        sketch2.normalized_rank_error(false)
    );
    assert_eq!(
        sketch1.normalized_rank_error(true),
        sketch2.normalized_rank_error(true)
    );
    let median = sketch1.quantile(0.5, true).unwrap().unwrap();
    let rank_eps = rank_eps(&sketch1);
    assert_approx_eq(median as f64, n as f64, n as f64 * rank_eps);
}

#[test]
fn test_merge_exact_mode_lower_k() {
    let mut sketch1 = KllSketch::<f32>::with_seed(256, 9).unwrap();
    let sketch2 = KllSketch::<f32>::new(128).unwrap();
    let n = 10_000;
    for i in 0..n {
        sketch1.update(i as f32).unwrap();
    }

    // An exact-mode operand does not degrade the error bound.
    let err_before = sketch1.normalized_rank_error(true);
    sketch1.merge(&sketch2);
    assert_eq!(sketch1.normalized_rank_error(true), err_before);

    assert_eq!(sketch1.n(), n as u64);
    assert_eq!(sketch1.min_item().cloned(), Some(0.0));
    assert_eq!(sketch1.max_item().cloned(), Some((n - 1) as f32));
    let median = sketch1.quantile(0.5, true).unwrap().unwrap();
    let rank_eps = rank_eps(&sketch1);
    assert_approx_eq(median as f64, (n / 2) as f64, (n as f64 / 2.0) * rank_eps);
}

#[test]
fn test_merge_min_max_from_other() {
    let mut sketch1 = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    let mut sketch2 = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    sketch1.update(1.0).unwrap();
    sketch2.update(2.0).unwrap();
    sketch2.merge(&sketch1);
    assert_eq!(sketch2.min_item().cloned(), Some(1.0));
    assert_eq!(sketch2.max_item().cloned(), Some(2.0));
}

#[test]
fn test_merge_min_max_large_other() {
    let mut sketch1 = KllSketch::<f32>::with_seed(DEFAULT_K, 10).unwrap();
    for i in 0..1_000_000 {
        sketch1.update(i as f32).unwrap();
    }
    let mut sketch2 = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    sketch2.merge(&sketch1);
    assert_eq!(sketch2.min_item().cloned(), Some(0.0));
    assert_eq!(sketch2.max_item().cloned(), Some(999_999.0));
    assert_eq!(sketch2.n(), 1_000_000);
}

#[test]
fn test_merge_association_orders_agree() {
    let n = 10_000;
    let build = |seed: u64, offset: i64| {
        let mut sketch = KllSketch::<i64>::with_seed(DEFAULT_K, seed).unwrap();
        for i in 0..n {
            sketch.update(offset + i).unwrap();
        }
        sketch
    };

    let (a, b, c) = (build(11, 0), build(12, n), build(13, 2 * n));

    // (a + b) + c
    let mut left = a.clone();
    left.merge(&b);
    left.merge(&c);

    // a + (b + c)
    let mut bc = b.clone();
    bc.merge(&c);
    let mut right = a.clone();
    right.merge(&bc);

    assert_eq!(left.n(), right.n());
    assert_eq!(left.min_item(), right.min_item());
    assert_eq!(left.max_item(), right.max_item());

    let eps = left.normalized_rank_error(false);
    for rank in [0.1, 0.5, 0.9] {
        let ql = left.quantile(rank, true).unwrap().unwrap();
        let qr = right.quantile(rank, true).unwrap().unwrap();
        let delta = (ql - qr).unsigned_abs();
        let bound = (3.0 * eps * (3 * n) as f64) as u64;
        assert!(delta <= bound, "quantiles diverge at rank {rank}: {ql} vs {qr}");
    }
}

#[test]
fn test_normalized_rank_error_decreases_with_k() {
    for pmf in [false, true] {
        let mut previous = f64::INFINITY;
        for k in [8u16, 16, 64, 200, 400, 1000] {
            let eps = normalized_rank_error(k, pmf);
            assert!(eps < previous, "error bound not decreasing at k={k}");
            assert!(eps > 0.0);
            previous = eps;
        }
    }
    // The two-sided PMF bound is looser than the single-quantile bound.
    assert!(normalized_rank_error(200, true) > normalized_rank_error(200, false));
}

#[test]
fn test_string_items() {
    let mut sketch = KllSketch::<String>::new(DEFAULT_K).unwrap();
    for word in ["delta", "alpha", "echo", "bravo", "charlie"] {
        sketch.update(word.to_string()).unwrap();
    }
    assert_eq!(sketch.min_item().map(String::as_str), Some("alpha"));
    assert_eq!(sketch.max_item().map(String::as_str), Some("echo"));
    let median = sketch.quantile(0.5, true).unwrap().unwrap();
    assert_eq!(median, "charlie");
}

#[test]
fn test_to_string_summary() {
    let mut sketch = KllSketch::<f32>::new(DEFAULT_K).unwrap();
    for i in 0..1000 {
        sketch.update(i as f32).unwrap();
    }
    let summary = sketch.to_string(false, false);
    assert_that!(summary.as_str(), contains_substring("KLL sketch summary"));
    assert_that!(summary.as_str(), contains_substring("N              : 1000"));
    assert!(!summary.contains("levels:"));

    let detailed = sketch.to_string(true, true);
    assert_that!(detailed.as_str(), contains_substring("KLL sketch levels"));
    assert_that!(detailed.as_str(), contains_substring("KLL sketch data"));
}
