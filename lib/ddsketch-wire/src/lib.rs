//! Decoding, merging, and querying of serialized DDSketch-style quantile sketches.
//!
//! Sketches arrive as compact byte strings: a fixed metadata header (format version, gamma, sum, and count) followed by
//! delta-encoded `(key, count)` buckets. This crate provides:
//!
//! - [`Decoder`]: a bounds-checked cursor over the wire format
//! - [`Sketch`]: an immutable, ordered view of a single sketch that can be serialized and queried
//! - [`Accumulator`]: a mutable merge engine for folding many serialized sketches into one
//! - [`ops`]: the byte-oriented operations exposed to host integrations (inspect, quantile, merge, and so on)
//!
//! Sketch construction from raw observations is not handled here: bucket boundaries (gamma) are decided by the producer
//! and are already baked into the input bytes.
#![deny(warnings)]
#![deny(missing_docs)]

mod accumulator;
pub use self::accumulator::{Accumulator, MergePolicy};

mod bucket;
pub use self::bucket::Bucket;

mod decoder;
pub use self::decoder::{Decoder, MAX_VARINT16_LEN, MAX_VARINT64_LEN};

mod encoder;
pub use self::encoder::{encode_varint, put_varint};

mod error;
pub use self::error::{AccumulatorError, DecodeError, MergeError, SketchError};

mod metadata;
pub use self::metadata::{Metadata, SUPPORTED_VERSION};

pub mod ops;

mod sketch;
pub use self::sketch::{QuantileOptions, Sketch};

#[cfg(test)]
mod common;
