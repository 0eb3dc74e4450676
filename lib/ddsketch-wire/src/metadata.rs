//! Sketch metadata.

use crate::{decoder::Decoder, error::DecodeError};

/// The only sketch format version understood by this crate.
pub const SUPPORTED_VERSION: u8 = 1;

/// Sketch metadata.
///
/// Every serialized sketch starts with this fixed-shape header: the format version, the scale parameter (gamma) that
/// defines bucket boundaries, and the running sum and count of all observations summarized by the sketch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metadata {
    /// Format version.
    pub version: u8,

    /// Bucket scale factor.
    ///
    /// Bucket `k` covers values in `[gamma^(k-1), gamma^k)`.
    pub gamma: f32,

    /// Sum of all observations.
    pub sum: f32,

    /// Number of observations.
    pub count: u64,
}

impl Metadata {
    /// Decodes only the metadata header from the given bytes.
    ///
    /// Any bytes following the header are ignored, so this succeeds for any input that starts with a valid header,
    /// regardless of whether the buckets that follow are well-formed.
    ///
    /// # Errors
    ///
    /// If the header is truncated, contains a non-finite float, or fails validation, an error is returned.
    pub fn deserialize(data: &[u8]) -> Result<Self, DecodeError> {
        Decoder::new(data).read_metadata()
    }

    /// Returns `true` if this metadata is well-formed.
    ///
    /// Well-formed metadata has a gamma strictly greater than one, a supported version, and a non-zero count.
    pub fn is_valid(&self) -> bool {
        self.gamma > 1.0 && self.version == SUPPORTED_VERSION && self.count != 0
    }

    /// Returns `true` if sketches described by `self` and `other` can be merged.
    ///
    /// Sketches are mergeable when they share the exact same gamma and format version. The sum and count are
    /// irrelevant.
    pub fn is_mergeable(&self, other: &Metadata) -> bool {
        self.gamma.to_bits() == other.gamma.to_bits() && self.version == other.version
    }

    /// Returns the mean of all observations.
    pub fn mean(&self) -> f64 {
        f64::from(self.sum) / self.count as f64
    }

    /// Returns the number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the sum of all observations.
    pub fn sum(&self) -> f64 {
        f64::from(self.sum)
    }

    /// Folds the sum and count of `other` into `self`.
    ///
    /// Callers are expected to have checked [`is_mergeable`][Self::is_mergeable] first.
    pub(crate) fn absorb(&mut self, other: &Metadata) {
        self.sum += other.sum;
        self.count = self.count.saturating_add(other.count);
    }
}
