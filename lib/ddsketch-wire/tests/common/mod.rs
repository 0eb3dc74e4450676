use std::collections::BTreeMap;

use bytes::Bytes;
use ddsketch_wire::{Bucket, Metadata, Sketch};
use rand::SeedableRng;
use rand_distr::{Distribution, Pareto};

/// Relative accuracy used to derive gamma for test sketches.
pub const ALPHA: f64 = 0.01;

/// Gamma for a relative accuracy of [`ALPHA`], as it would be stored on the wire.
#[allow(clippy::cast_possible_truncation)]
pub fn gamma() -> f32 {
    ((1.0 + ALPHA) / (1.0 - ALPHA)) as f32
}

/// Bucket key for `value`, such that the value falls in `(gamma^(key-1), gamma^key]`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn key_for(value: f64) -> u16 {
    (value.ln() / f64::from(gamma()).ln()).ceil() as u16
}

/// Builds a serialized sketch from raw observations.
#[allow(clippy::cast_possible_truncation)]
pub fn sketch_bytes(values: &[f64]) -> Bytes {
    let mut buckets = BTreeMap::new();
    for value in values {
        *buckets.entry(key_for(*value)).or_insert(0u64) += 1;
    }

    let metadata = Metadata {
        version: 1,
        gamma: gamma(),
        sum: values.iter().sum::<f64>() as f32,
        count: values.len() as u64,
    };

    Sketch::from_parts(metadata, buckets.into_iter().map(|(key, count)| Bucket::new(key, count)))
        .expect("test sketch should be well-formed")
        .serialize()
}

pub fn make_points(size: usize) -> Vec<f64> {
    // Generate a set of samples that roughly correspond to the latency of a typical web service, in microseconds: big
    // hump at the beginning with a long tail. Samples bottom out at 15 milliseconds and tail off all the way up to 10
    // seconds.
    let distribution = Pareto::new(1.0, 1.0).expect("pareto distribution should be valid");
    let seed = 0xC0FFEE;

    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    distribution
        .sample_iter(&mut rng)
        // Scale by 10,000 to get microseconds.
        .map(|n| n * 10_000.0)
        .filter(|n| *n > 15_000.0 && *n < 10_000_000.0)
        .take(size)
        .collect::<Vec<_>>()
}
