//! Immutable sketch representation.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::ser::{Serialize, SerializeMap as _, SerializeStruct as _, Serializer};
use smallvec::SmallVec;

use crate::{
    bucket::Bucket,
    decoder::{Decoder, MAX_VARINT16_LEN, MAX_VARINT64_LEN},
    encoder::put_varint,
    error::{DecodeError, EmptyBuckets, NoBuckets, NonAscendingKey, SketchError, UnorderedKeys},
    metadata::Metadata,
};

// Fixed-width portion of the header: version, gamma, and sum.
const FIXED_HEADER_LEN: usize = 1 + 4 + 4;

// The smallest possible encoded bucket is a one-byte delta followed by a one-byte count.
const MIN_ENCODED_BUCKET_LEN: usize = 2;

/// Options controlling quantile estimation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantileOptions {
    /// Whether quantiles above one are clamped to one before computing the target rank.
    ///
    /// Quantiles below zero are always treated as zero. Without the upper clamp, a quantile above one produces a rank
    /// beyond the sketch's count, and the estimate falls through to the highest bucket. For sketches whose bucket counts
    /// add up to their metadata count, both behaviors give the same answer.
    ///
    /// Defaults to `true`.
    pub clamp_upper: bool,
}

impl Default for QuantileOptions {
    fn default() -> Self {
        Self { clamp_upper: true }
    }
}

/// An immutable sketch.
///
/// Combines a [`Metadata`] header with a non-empty sequence of [`Bucket`]s held in strictly ascending key order. Both
/// serialization (which delta-encodes keys) and quantile estimation (which scans cumulative counts) rely on that
/// ordering, so it is established once, at construction, and the sketch is never mutated afterwards.
///
/// Sketches are cheap to query, but every query is a linear scan over the buckets: relative-error histograms compress
/// large samples into few buckets, so no index is maintained.
#[derive(Clone, Debug, PartialEq)]
pub struct Sketch {
    metadata: Metadata,
    buckets: SmallVec<[Bucket; 4]>,
}

impl Sketch {
    /// Creates a `Sketch` from metadata and buckets.
    ///
    /// # Errors
    ///
    /// If `buckets` is empty, or its keys are not strictly ascending, an error is returned.
    pub fn from_parts<I>(metadata: Metadata, buckets: I) -> Result<Self, SketchError>
    where
        I: IntoIterator<Item = Bucket>,
    {
        let buckets = buckets.into_iter().collect::<SmallVec<[Bucket; 4]>>();
        if buckets.is_empty() {
            return EmptyBuckets.fail();
        }

        if let Some(pair) = buckets.windows(2).find(|pair| pair[0].key >= pair[1].key) {
            return UnorderedKeys {
                previous: pair[0].key,
                key: pair[1].key,
            }
            .fail();
        }

        Ok(Self { metadata, buckets })
    }

    /// Creates a `Sketch` from buckets that are already known to be non-empty and strictly ascending by key.
    pub(crate) fn from_sorted(metadata: Metadata, buckets: SmallVec<[Bucket; 4]>) -> Self {
        debug_assert!(!buckets.is_empty());
        debug_assert!(buckets.windows(2).all(|pair| pair[0].key < pair[1].key));

        Self { metadata, buckets }
    }

    /// Decodes a serialized sketch.
    ///
    /// Buckets are read until the input is exhausted. Keys must come out strictly ascending: a zero delta after the
    /// first bucket (duplicate key) or a delta that wraps past `u16::MAX` (descending key) marks the input as malformed.
    ///
    /// # Errors
    ///
    /// If the metadata or any bucket fails to decode, if keys are not strictly ascending, or if there are no buckets at
    /// all, an error is returned.
    pub fn deserialize(data: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(data);
        let metadata = decoder.read_metadata()?;

        // Upper bound on the number of buckets remaining, which lets us avoid reallocating while decoding.
        let mut buckets = SmallVec::<[Bucket; 4]>::with_capacity(decoder.bytes_left() / MIN_ENCODED_BUCKET_LEN);
        while !decoder.is_empty() {
            let bucket = decoder.read_bucket()?;
            if let Some(previous) = buckets.last() {
                if previous.key >= bucket.key {
                    return NonAscendingKey {
                        previous: previous.key,
                        key: bucket.key,
                    }
                    .fail();
                }
            }
            buckets.push(bucket);
        }

        if buckets.is_empty() {
            return NoBuckets.fail();
        }
        buckets.shrink_to_fit();

        Ok(Self { metadata, buckets })
    }

    /// Serializes this sketch.
    ///
    /// This is the inverse of [`deserialize`][Self::deserialize].
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.max_encoded_len());
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes this sketch into the given buffer.
    pub fn serialize_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.metadata.version);
        buf.put_f32_le(self.metadata.gamma);
        buf.put_f32_le(self.metadata.sum);
        put_varint(buf, self.metadata.count);

        let mut prev_key = 0u16;
        for bucket in &self.buckets {
            put_varint(buf, u64::from(bucket.key.wrapping_sub(prev_key)));
            put_varint(buf, bucket.count);
            prev_key = bucket.key;
        }
    }

    fn max_encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + MAX_VARINT64_LEN + self.buckets.len() * (MAX_VARINT16_LEN + MAX_VARINT64_LEN)
    }

    /// Returns the metadata of this sketch.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the buckets of this sketch, in ascending key order.
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Returns the number of buckets in the sketch.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of observations represented by this sketch.
    pub fn count(&self) -> u64 {
        self.metadata.count()
    }

    /// Sum of all observations represented by this sketch.
    pub fn sum(&self) -> f64 {
        self.metadata.sum()
    }

    /// Mean of all observations represented by this sketch.
    pub fn mean(&self) -> f64 {
        self.metadata.mean()
    }

    /// Gets the estimated value at the given quantile, using the default options.
    pub fn quantile(&self, q: f64) -> f64 {
        self.quantile_with_options(q, QuantileOptions::default())
    }

    /// Gets the estimated value at the given quantile.
    ///
    /// The target rank is `q * count`, rounded half away from zero. The answer comes from the first bucket whose
    /// cumulative count reaches that rank, or from the last bucket if none does, and is the bucket midpoint
    /// `2 * gamma^key / (gamma + 1)`.
    ///
    /// Negative (and NaN) quantiles are treated as zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn quantile_with_options(&self, q: f64, options: QuantileOptions) -> f64 {
        let mut q = if q.is_nan() { 0.0 } else { q.max(0.0) };
        if options.clamp_upper {
            q = q.min(1.0);
        }

        // Float-to-integer casts saturate, so an out-of-range rank simply becomes unreachable.
        let rank = (q * self.metadata.count as f64).round() as u64;

        let mut cumulative = 0u64;
        let key = self
            .buckets
            .iter()
            .find(|bucket| {
                cumulative = cumulative.saturating_add(bucket.count);
                cumulative >= rank
            })
            .or_else(|| self.buckets.last())
            .map_or(0, |bucket| bucket.key);

        let gamma = f64::from(self.metadata.gamma);
        2.0 * gamma.powf(f64::from(key)) / (gamma + 1.0)
    }

    /// Renders a human-readable description of this sketch.
    ///
    /// Floats use the shortest representation that round-trips (`gamma:1.020202`), not a fixed six significant digits.
    pub fn inspect(&self) -> String {
        self.to_string()
    }

    /// Renders this sketch as a JSON object.
    ///
    /// Buckets are rendered as an object keyed by bucket key, in ascending key order.
    ///
    /// # Errors
    ///
    /// If the sketch cannot be serialized to JSON, an error is returned.
    pub fn json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Sketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sketch<version: {}, sum:{}, count:{}, gamma:{}, bucket_count: {}, buckets:{{",
            self.metadata.version,
            self.metadata.sum,
            self.metadata.count,
            self.metadata.gamma,
            self.buckets.len()
        )?;

        for bucket in &self.buckets {
            write!(f, "{}: {}, ", bucket.key, bucket.count)?;
        }

        write!(f, "}}>")
    }
}

impl Serialize for Sketch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Sketch", 5)?;
        state.serialize_field("version", &self.metadata.version)?;
        state.serialize_field("sum", &self.metadata.sum)?;
        state.serialize_field("count", &self.metadata.count)?;
        state.serialize_field("gamma", &self.metadata.gamma)?;
        state.serialize_field("buckets", &BucketMap(&self.buckets))?;
        state.end()
    }
}

struct BucketMap<'a>(&'a [Bucket]);

impl Serialize for BucketMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for bucket in self.0 {
            map.serialize_entry(&bucket.key, &bucket.count)?;
        }
        map.end()
    }
}
