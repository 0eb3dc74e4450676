//! Varint encoding.

use bytes::BufMut;
use smallvec::SmallVec;

use crate::decoder::MAX_VARINT64_LEN;

/// Encodes `value` as a base-128 varint.
///
/// Groups of seven bits are emitted least-significant first, with the high bit set on every byte except the last. This
/// is the inverse of [`Decoder::read_varint`][crate::Decoder::read_varint].
#[allow(clippy::cast_possible_truncation)]
pub fn encode_varint(mut value: u64) -> SmallVec<[u8; MAX_VARINT64_LEN]> {
    let mut out = SmallVec::new();
    while value & !0x7F != 0 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }

    out.push(value as u8);
    out
}

/// Writes `value` as a base-128 varint into `buf`.
pub fn put_varint<B: BufMut + ?Sized>(buf: &mut B, value: u64) {
    buf.put_slice(&encode_varint(value));
}
