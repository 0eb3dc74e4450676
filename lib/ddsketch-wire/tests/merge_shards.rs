//! Merging sharded sketches must produce the same histogram as sketching the whole sample at once.

use ddsketch_wire::{ops, ops::SumAggregate, Accumulator, Sketch};

use crate::common::{make_points, sketch_bytes, ALPHA};

mod common;

#[test]
fn sharded_sum_matches_whole() {
    let points = make_points(10_000);
    let whole = Sketch::deserialize(&sketch_bytes(&points)).unwrap();

    let mut agg = SumAggregate::new();
    for shard in points.chunks(731) {
        agg.add(Some(&sketch_bytes(shard))).unwrap();
    }

    let merged = Sketch::deserialize(&agg.finalize().unwrap().unwrap()).unwrap();
    assert_eq!(merged.count(), whole.count());
    assert_eq!(merged.buckets(), whole.buckets());

    // Sums are accumulated in single precision, so only approximate agreement is possible.
    let relative_diff = (merged.sum() - whole.sum()).abs() / whole.sum();
    assert!(relative_diff < 1e-4, "relative sum difference too large: {}", relative_diff);
}

#[test]
fn pairwise_merge_matches_accumulator() {
    let points = make_points(3_000);
    let (left, right) = points.split_at(1_234);

    let pairwise = ops::merge_pair(Some(&sketch_bytes(left)), Some(&sketch_bytes(right)))
        .unwrap()
        .unwrap();

    let mut acc = Accumulator::new();
    acc.merge(&sketch_bytes(right)).unwrap();
    acc.merge(&sketch_bytes(left)).unwrap();
    let accumulated = acc.to_sketch().unwrap();

    let pairwise = Sketch::deserialize(&pairwise).unwrap();
    assert_eq!(pairwise.count(), accumulated.count());
    assert_eq!(pairwise.buckets(), accumulated.buckets());
}

#[test]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn merged_quantiles_within_relative_error() {
    let mut points = make_points(5_000);

    let mut agg = SumAggregate::new();
    for shard in points.chunks(499) {
        agg.add(Some(&sketch_bytes(shard))).unwrap();
    }
    let merged = agg.finalize().unwrap().unwrap();

    points.sort_by(|a, b| a.total_cmp(b));

    // Allow an extra 1/10,000th of a percent for floating-point error.
    let relative_error = ALPHA + 0.000001;
    for q in [0.0, 0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99, 0.999, 1.0] {
        let rank = (q * points.len() as f64).round() as usize;
        let expected = points[rank.max(1) - 1];
        let estimate = ops::quantile(q, &merged).unwrap();

        assert!(
            (estimate - expected).abs() <= expected * relative_error,
            "q={} expected={} estimate={}",
            q,
            expected,
            estimate
        );
    }
}
