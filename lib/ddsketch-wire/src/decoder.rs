//! Bounds-checked decoding of the sketch wire format.

use snafu::OptionExt as _;

use crate::{
    bucket::Bucket,
    error::{DecodeError, InvalidMetadata, NonFiniteFloat, UnexpectedEof, VarintOverflow},
    metadata::Metadata,
};

/// Maximum encoded length of a varint carrying a 16-bit value.
pub const MAX_VARINT16_LEN: usize = 3;

/// Maximum encoded length of a varint carrying a 64-bit value.
pub const MAX_VARINT64_LEN: usize = 10;

const CONTINUATION_BIT: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;

/// A forward-only cursor over a serialized sketch.
///
/// The primitive readers (`read_varint`, `read_u8`, `read_f32`, and friends) return `None` when the value cannot be
/// decoded, and never move the cursor in that case. The structured readers (`read_metadata`, `read_bucket`) are built on
/// top of the primitives, report which field failed, and are likewise all-or-nothing with respect to the cursor.
///
/// Bucket keys are delta-encoded on the wire, so the decoder tracks the key of the last bucket it read. This state is
/// scoped to the decoder, and so to a single decode session.
#[derive(Clone, Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    prev_key: u16,
}

impl<'a> Decoder<'a> {
    /// Creates a new `Decoder` positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            prev_key: 0,
        }
    }

    /// Returns `true` if all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the number of unread bytes.
    pub fn bytes_left(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns the current read position, in bytes from the start of the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Consumes exactly `len` bytes, returning them.
    ///
    /// Returns `None`, without consuming anything, if fewer than `len` bytes remain.
    pub fn advance(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    /// Reads a base-128 varint of at most `max_len` bytes.
    ///
    /// Each byte contributes its low seven bits, least-significant group first, and the high bit marks that another
    /// byte follows. Returns `None`, without consuming anything, if the input ends before a terminating byte or if
    /// `max_len` bytes are read without finding one.
    pub fn read_varint(&mut self, max_len: usize) -> Option<u64> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let mut value = 0u64;

        for (i, byte) in remaining.iter().take(max_len).enumerate() {
            let shift = 7 * i;
            if shift < 64 {
                value |= u64::from(byte & PAYLOAD_MASK) << shift;
            }

            if byte & CONTINUATION_BIT == 0 {
                self.pos += i + 1;
                return Some(value);
            }
        }

        None
    }

    /// Reads a varint carrying a 16-bit value.
    ///
    /// Three bytes are enough to cover the 16-bit range. Bits beyond the low sixteen are discarded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_varint16(&mut self) -> Option<u16> {
        // Truncation is intentional: keys are 16-bit on the wire and wrap accordingly.
        self.read_varint(MAX_VARINT16_LEN).map(|v| v as u16)
    }

    /// Reads a varint carrying a 64-bit value.
    pub fn read_varint64(&mut self) -> Option<u64> {
        self.read_varint(MAX_VARINT64_LEN)
    }

    /// Reads a single fixed-width byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        self.advance(1).map(|bytes| bytes[0])
    }

    /// Reads a little-endian IEEE-754 single-precision float.
    ///
    /// Returns `None` if fewer than four bytes remain, or if the value is NaN or infinite. The cursor is only moved when
    /// a finite value is returned.
    pub fn read_f32(&mut self) -> Option<f32> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(4)?)?;
        let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if !value.is_finite() {
            return None;
        }

        self.pos += 4;
        Some(value)
    }

    /// Reads and validates a metadata header.
    ///
    /// The header is, in order: a one-byte version, a four-byte gamma, a four-byte sum, and a varint count.
    ///
    /// # Errors
    ///
    /// If any field fails to decode, or the decoded metadata is not valid, an error is returned and the cursor is left
    /// where it was.
    pub fn read_metadata(&mut self) -> Result<Metadata, DecodeError> {
        let start = self.pos;
        let result = self.read_metadata_fields();
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    fn read_metadata_fields(&mut self) -> Result<Metadata, DecodeError> {
        let version = self.read_u8().context(UnexpectedEof { field: "version" })?;
        let gamma = self.f32_field("gamma")?;
        let sum = self.f32_field("sum")?;
        let count = self.varint_field("count", MAX_VARINT64_LEN)?;

        let metadata = Metadata {
            version,
            gamma,
            sum,
            count,
        };

        if !metadata.is_valid() {
            return InvalidMetadata { version, gamma, count }.fail();
        }

        Ok(metadata)
    }

    /// Reads the next bucket.
    ///
    /// The key is stored as a delta from the previous bucket's key, and addition wraps at sixteen bits.
    ///
    /// # Errors
    ///
    /// If either field fails to decode, an error is returned, and neither the cursor nor the previous key is changed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_bucket(&mut self) -> Result<Bucket, DecodeError> {
        let start = self.pos;

        let delta = self.varint_field("bucket key", MAX_VARINT16_LEN)?;
        let count = match self.varint_field("bucket count", MAX_VARINT64_LEN) {
            Ok(count) => count,
            Err(e) => {
                self.pos = start;
                return Err(e);
            }
        };

        let key = self.prev_key.wrapping_add(delta as u16);
        self.prev_key = key;

        Ok(Bucket { key, count })
    }

    fn f32_field(&mut self, field: &'static str) -> Result<f32, DecodeError> {
        if self.bytes_left() < 4 {
            return UnexpectedEof { field }.fail();
        }

        self.read_f32().context(NonFiniteFloat { field })
    }

    fn varint_field(&mut self, field: &'static str, max_len: usize) -> Result<u64, DecodeError> {
        match self.read_varint(max_len) {
            Some(value) => Ok(value),
            None if self.bytes_left() >= max_len => VarintOverflow { field, max_len }.fail(),
            None => UnexpectedEof { field }.fail(),
        }
    }
}
