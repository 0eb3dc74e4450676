use snafu::Snafu;

/// Errors that can occur while decoding a serialized sketch.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum DecodeError {
    /// The input ended before the given field could be fully read.
    #[snafu(display("unexpected end of input while reading {}", field))]
    UnexpectedEof {
        /// Name of the field being read.
        field: &'static str,
    },

    /// A varint did not terminate within its maximum encoded length.
    #[snafu(display("varint for {} did not terminate within {} bytes", field, max_len))]
    VarintOverflow {
        /// Name of the field being read.
        field: &'static str,

        /// Maximum number of bytes allowed for the field.
        max_len: usize,
    },

    /// A float field decoded to NaN or an infinity.
    #[snafu(display("non-finite value for {}", field))]
    NonFiniteFloat {
        /// Name of the field being read.
        field: &'static str,
    },

    /// The metadata decoded cleanly but failed validation.
    #[snafu(display(
        "invalid metadata: version={} gamma={} count={} (expected version 1, gamma > 1, count > 0)",
        version,
        gamma,
        count
    ))]
    InvalidMetadata {
        /// Decoded format version.
        version: u8,

        /// Decoded gamma.
        gamma: f32,

        /// Decoded observation count.
        count: u64,
    },

    /// The sketch contained a valid header but no buckets.
    #[snafu(display("sketch contains no buckets"))]
    NoBuckets,

    /// A bucket key did not strictly exceed the key before it.
    #[snafu(display("bucket key {} does not follow previous key {} in strictly ascending order", key, previous))]
    NonAscendingKey {
        /// Key of the preceding bucket.
        previous: u16,

        /// Offending key.
        key: u16,
    },
}

/// Errors that can occur while merging a serialized sketch into an accumulator.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum MergeError {
    /// The incoming sketch could not be decoded.
    #[snafu(display("failed to decode incoming sketch: {}", source))]
    Decode {
        /// Error source.
        source: DecodeError,
    },

    /// The incoming sketch uses a different gamma or format version than the accumulated one.
    #[snafu(display(
        "incompatible sketch: expected version {} / gamma {}, got version {} / gamma {}",
        expected_version,
        expected_gamma,
        actual_version,
        actual_gamma
    ))]
    Incompatible {
        /// Format version of the accumulated metadata.
        expected_version: u8,

        /// Gamma of the accumulated metadata.
        expected_gamma: f32,

        /// Format version of the incoming metadata.
        actual_version: u8,

        /// Gamma of the incoming metadata.
        actual_gamma: f32,
    },

    /// Adding the incoming sum to the accumulated one would leave the range of a finite `f32`.
    #[snafu(display("sum overflow: accumulated sum {} plus incoming sum {} is not finite", sum, incoming))]
    SumOverflow {
        /// Accumulated sum.
        sum: f32,

        /// Sum of the incoming metadata.
        incoming: f32,
    },
}

impl From<DecodeError> for MergeError {
    fn from(source: DecodeError) -> Self {
        Self::Decode { source }
    }
}

/// Errors that can occur when materializing a sketch from an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum AccumulatorError {
    /// Nothing has been successfully merged into the accumulator yet.
    #[snafu(display("accumulator holds no metadata; nothing has been merged"))]
    Empty,

    /// The accumulator holds metadata but no buckets.
    ///
    /// Only reachable after a failed merge under [`MergePolicy::Legacy`][crate::MergePolicy::Legacy].
    #[snafu(display("accumulator holds metadata but no buckets"))]
    NoBuckets,
}

/// Errors that can occur when building a sketch from its parts.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum SketchError {
    /// No buckets were given.
    #[snafu(display("sketch must contain at least one bucket"))]
    EmptyBuckets,

    /// Bucket keys were not strictly ascending.
    #[snafu(display("bucket key {} does not follow previous key {} in strictly ascending order", key, previous))]
    UnorderedKeys {
        /// Key of the preceding bucket.
        previous: u16,

        /// Offending key.
        key: u16,
    },
}
