//! Sketch bucket representation.

/// A sketch bucket.
///
/// Holds the number of observations that fell into histogram cell `key`. Within a sketch, buckets are kept in strictly
/// ascending key order; the count never participates in ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Bucket {
    /// The bucket index.
    pub key: u16,

    /// The number of observations within the bucket.
    pub count: u64,
}

impl Bucket {
    /// Creates a new `Bucket`.
    pub const fn new(key: u16, count: u64) -> Self {
        Self { key, count }
    }
}
