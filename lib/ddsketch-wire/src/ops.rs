//! Byte-oriented sketch operations for host integrations.
//!
//! Each operation takes serialized sketches as opaque byte slices and either returns a value or reports that the input
//! could not be used. Argument checking, NULL propagation, and buffer lifetimes belong to the host; absent inputs are
//! modeled as `Option` only where an operation gives them a meaning (merging, aggregation).
//!
//! Scalar queries (`quantile`, `mean`, `count`, `total`) return `None` for malformed input, mirroring a NULL result.
//! `mean`, `count`, and `total` only decode the metadata header, so they accept any input that starts with a valid
//! header.

use bytes::Bytes;
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::{
    accumulator::{Accumulator, MergePolicy},
    error::{AccumulatorError, DecodeError, MergeError},
    metadata::Metadata,
    sketch::{QuantileOptions, Sketch},
};

/// An operation error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum OpError {
    /// The input sketch could not be decoded.
    #[snafu(display("malformed sketch: {}", source))]
    Malformed {
        /// Error source.
        source: DecodeError,
    },

    /// A sketch could not be merged.
    #[snafu(display("failed to merge sketch: {}", source))]
    Merge {
        /// Error source.
        source: MergeError,
    },

    /// The merged sketch could not be materialized.
    #[snafu(display("failed to materialize merged sketch: {}", source))]
    Materialize {
        /// Error source.
        source: AccumulatorError,
    },

    /// The sketch could not be rendered as JSON.
    #[snafu(display("failed to render sketch as JSON: {}", source))]
    Render {
        /// Error source.
        source: serde_json::Error,
    },
}

fn deserialize(data: &[u8]) -> Result<Sketch, OpError> {
    Sketch::deserialize(data)
        .inspect_err(|e| debug!(error = %e, bytes = data.len(), "Rejected malformed sketch."))
        .context(Malformed)
}

fn deserialize_metadata(data: &[u8]) -> Option<Metadata> {
    Metadata::deserialize(data)
        .inspect_err(|e| debug!(error = %e, bytes = data.len(), "Rejected malformed sketch header."))
        .ok()
}

/// Renders a human-readable description of the given sketch.
///
/// # Errors
///
/// If the sketch is malformed, an error is returned.
pub fn inspect(data: &[u8]) -> Result<String, OpError> {
    deserialize(data).map(|sketch| sketch.inspect())
}

/// Renders the given sketch as JSON.
///
/// # Errors
///
/// If the sketch is malformed, or cannot be rendered, an error is returned.
pub fn json(data: &[u8]) -> Result<String, OpError> {
    deserialize(data)?.json().context(Render)
}

/// Estimates the value at quantile `q` of the given sketch.
///
/// Returns `None` if the sketch is malformed.
pub fn quantile(q: f64, data: &[u8]) -> Option<f64> {
    quantile_with_options(q, data, QuantileOptions::default())
}

/// Estimates the value at quantile `q` of the given sketch, with explicit estimation options.
///
/// Returns `None` if the sketch is malformed.
pub fn quantile_with_options(q: f64, data: &[u8], options: QuantileOptions) -> Option<f64> {
    deserialize(data)
        .ok()
        .map(|sketch| sketch.quantile_with_options(q, options))
}

/// Returns the mean of all observations in the given sketch.
///
/// Returns `None` if the sketch header is malformed.
pub fn mean(data: &[u8]) -> Option<f64> {
    deserialize_metadata(data).map(|metadata| metadata.mean())
}

/// Returns the number of observations in the given sketch.
///
/// Returns `None` if the sketch header is malformed.
pub fn count(data: &[u8]) -> Option<u64> {
    deserialize_metadata(data).map(|metadata| metadata.count())
}

/// Returns the sum of all observations in the given sketch.
///
/// Returns `None` if the sketch header is malformed.
pub fn total(data: &[u8]) -> Option<f64> {
    deserialize_metadata(data).map(|metadata| metadata.sum())
}

/// Returns `true` if the given sketch decodes successfully.
pub fn is_valid(data: &[u8]) -> bool {
    Sketch::deserialize(data).is_ok()
}

/// Merges two optional sketches.
///
/// An absent sketch acts as the identity: when only one sketch is present, its bytes are returned as-is, without being
/// decoded. When both are absent, `None` is returned.
///
/// # Errors
///
/// If both sketches are present and either is malformed, or they are not mergeable, an error is returned.
pub fn merge_pair(a: Option<&[u8]>, b: Option<&[u8]>) -> Result<Option<Bytes>, OpError> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(only), None) | (None, Some(only)) => Ok(Some(Bytes::copy_from_slice(only))),
        (Some(a), Some(b)) => {
            let mut acc = Accumulator::new();
            acc.merge(a).context(Merge)?;
            acc.merge(b).context(Merge)?;

            let sketch = acc.to_sketch().context(Materialize)?;
            Ok(Some(sketch.serialize()))
        }
    }
}

/// Aggregate state for summing many sketches together.
///
/// Sketches are fed in one at a time with [`add`][Self::add], and the merged result is produced with
/// [`finalize`][Self::finalize]. The state can be reused for another group after calling [`clear`][Self::clear].
#[derive(Debug, Default)]
pub struct SumAggregate {
    acc: Accumulator,
    set: bool,
}

impl SumAggregate {
    /// Creates an empty `SumAggregate` with the default merge policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `SumAggregate` with the given merge policy.
    pub fn with_policy(policy: MergePolicy) -> Self {
        Self {
            acc: Accumulator::with_policy(policy),
            set: false,
        }
    }

    /// Adds a sketch to the aggregate.
    ///
    /// Absent sketches are ignored.
    ///
    /// # Errors
    ///
    /// If the sketch is malformed or not mergeable with the sketches added so far, an error is returned.
    pub fn add(&mut self, data: Option<&[u8]>) -> Result<(), MergeError> {
        let Some(data) = data else {
            return Ok(());
        };

        self.acc.merge(data)?;
        self.set = true;
        Ok(())
    }

    /// Returns `true` if at least one sketch has been successfully added.
    pub fn is_set(&self) -> bool {
        self.set
    }

    /// Clears the aggregate, returning it to its freshly-constructed state.
    pub fn clear(&mut self) {
        self.acc.clear();
        self.set = false;
    }

    /// Produces the serialized merge of all sketches added so far.
    ///
    /// Returns `None` if no sketch was ever successfully added.
    ///
    /// # Errors
    ///
    /// If the accumulated state cannot be materialized, an error is returned. This can only happen when a failed merge
    /// left the state inconsistent under [`MergePolicy::Legacy`].
    pub fn finalize(&self) -> Result<Option<Bytes>, OpError> {
        if !self.set {
            return Ok(None);
        }

        let sketch = self.acc.to_sketch().context(Materialize)?;
        Ok(Some(sketch.serialize()))
    }
}
