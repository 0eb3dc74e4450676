//! Mutable merge engine for serialized sketches.

use foldhash::quality::RandomState;
use serde::Deserialize;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    bucket::Bucket,
    decoder::Decoder,
    error::{AccumulatorError, DecodeError, Incompatible, MergeError, SumOverflow},
    metadata::Metadata,
    sketch::Sketch,
};

type FastHashMap<K, V> = hashbrown::HashMap<K, V, RandomState>;

/// Commit semantics for [`Accumulator::merge`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// A merge either applies completely or not at all.
    ///
    /// Incoming buckets are fully decoded into scratch space before anything is folded in, so a merge that fails leaves
    /// the accumulator exactly as it was.
    #[default]
    Atomic,

    /// Metadata and buckets are folded in as they are decoded.
    ///
    /// If a bucket fails to decode partway through the input, the sum and count have already been added and the buckets
    /// decoded so far have already been folded in, so the accumulator no longer describes a consistent sketch. This
    /// mirrors the behavior of older merge implementations and exists only for compatibility with them.
    Legacy,
}

/// A mutable sketch accumulator.
///
/// Buckets are held in a hash map from key to count, so merging a bucket that already exists is a single lookup and
/// addition rather than a re-sort. Ordering is only established when materializing a [`Sketch`] via
/// [`to_sketch`][Self::to_sketch].
///
/// Accumulators are not synchronized: concurrent merges into the same instance need external locking. Instances can be
/// reused across independent aggregations by calling [`clear`][Self::clear].
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    metadata: Option<Metadata>,
    buckets: FastHashMap<u16, u64>,
    policy: MergePolicy,
    scratch: Vec<Bucket>,
}

impl Accumulator {
    /// Creates an empty `Accumulator` with the default merge policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `Accumulator` with the given merge policy.
    pub fn with_policy(policy: MergePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Returns the merge policy of this accumulator.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Returns the combined metadata, if anything has been merged.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Returns the accumulated count for the given bucket key, if present.
    pub fn bucket(&self, key: u16) -> Option<u64> {
        self.buckets.get(&key).copied()
    }

    /// Returns an iterator over the accumulated buckets, in no particular order.
    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.buckets.iter().map(|(&key, &count)| Bucket::new(key, count))
    }

    /// Returns the number of distinct bucket keys seen so far.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if nothing has been merged into this accumulator.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.buckets.is_empty()
    }

    /// Merges a serialized sketch into this accumulator.
    ///
    /// The first sketch merged supplies the metadata outright. Every subsequent sketch must be mergeable with it (same
    /// gamma and version), and has its sum and count added in. Bucket counts are summed per key.
    ///
    /// # Errors
    ///
    /// If the incoming sketch is incompatible, fails to decode, would push the accumulated sum past the range of a
    /// finite `f32`, or if the accumulator would end up with no buckets at all, an error is returned. Whether a failed merge leaves the accumulator untouched depends on the
    /// [`MergePolicy`].
    pub fn merge(&mut self, data: &[u8]) -> Result<(), MergeError> {
        let result = match self.policy {
            MergePolicy::Atomic => self.merge_atomic(data),
            MergePolicy::Legacy => self.merge_legacy(data),
        };

        match &result {
            Ok(()) => trace!(bytes = data.len(), buckets = self.buckets.len(), "Merged sketch."),
            Err(e) => debug!(error = %e, bytes = data.len(), policy = ?self.policy, "Failed to merge sketch."),
        }

        result
    }

    fn merge_atomic(&mut self, data: &[u8]) -> Result<(), MergeError> {
        let mut decoder = Decoder::new(data);
        let incoming = decoder.read_metadata()?;
        self.check_mergeable(&incoming)?;

        self.scratch.clear();
        while !decoder.is_empty() {
            match decoder.read_bucket() {
                Ok(bucket) => self.scratch.push(bucket),
                Err(e) => {
                    self.scratch.clear();
                    return Err(e.into());
                }
            }
        }

        if self.scratch.is_empty() && self.buckets.is_empty() {
            return Err(DecodeError::NoBuckets.into());
        }

        self.absorb_metadata(incoming);
        for bucket in self.scratch.drain(..) {
            let count = self.buckets.entry(bucket.key).or_insert(0);
            *count = count.saturating_add(bucket.count);
        }

        Ok(())
    }

    fn merge_legacy(&mut self, data: &[u8]) -> Result<(), MergeError> {
        let mut decoder = Decoder::new(data);
        let incoming = decoder.read_metadata()?;
        self.check_mergeable(&incoming)?;
        self.absorb_metadata(incoming);

        while !decoder.is_empty() {
            let bucket = decoder.read_bucket()?;
            let count = self.buckets.entry(bucket.key).or_insert(0);
            *count = count.saturating_add(bucket.count);
        }

        if self.buckets.is_empty() {
            return Err(DecodeError::NoBuckets.into());
        }

        Ok(())
    }

    fn check_mergeable(&self, incoming: &Metadata) -> Result<(), MergeError> {
        match &self.metadata {
            Some(held) if !held.is_mergeable(incoming) => Incompatible {
                expected_version: held.version,
                expected_gamma: held.gamma,
                actual_version: incoming.version,
                actual_gamma: incoming.gamma,
            }
            .fail(),
            Some(held) if !(held.sum + incoming.sum).is_finite() => SumOverflow {
                sum: held.sum,
                incoming: incoming.sum,
            }
            .fail(),
            _ => Ok(()),
        }
    }

    fn absorb_metadata(&mut self, incoming: Metadata) {
        match &mut self.metadata {
            Some(held) => held.absorb(&incoming),
            None => self.metadata = Some(incoming),
        }
    }

    /// Materializes the accumulated state as an immutable [`Sketch`].
    ///
    /// Buckets are sorted by key, as the underlying map has no inherent ordering.
    ///
    /// # Errors
    ///
    /// If nothing has been successfully merged yet, an error is returned.
    pub fn to_sketch(&self) -> Result<Sketch, AccumulatorError> {
        let metadata = self.metadata.ok_or(AccumulatorError::Empty)?;
        if self.buckets.is_empty() {
            return Err(AccumulatorError::NoBuckets);
        }

        let mut buckets = self.buckets().collect::<SmallVec<[Bucket; 4]>>();
        buckets.sort_unstable_by_key(|bucket| bucket.key);

        trace!(buckets = buckets.len(), count = metadata.count, "Materialized sketch from accumulator.");

        Ok(Sketch::from_sorted(metadata, buckets))
    }

    /// Clears the accumulator, returning it to its freshly-constructed state.
    ///
    /// The merge policy is retained.
    pub fn clear(&mut self) {
        self.metadata = None;
        self.buckets.clear();
        self.scratch.clear();
    }
}
