//! Base-128 varint and ZigZag primitives.
//!
//! Each byte carries 7 payload bits, least significant group first; the high
//! bit marks that more bytes follow. A 64-bit value needs at most 10 bytes.
//!
//! Signed types come in two flavours on the wire:
//! - `int32`/`int64`: two's-complement bit pattern cast to unsigned, so a
//!   negative value always costs 10 bytes
//! - `sint32`/`sint64`: ZigZag mapped first, so small magnitudes stay small

use crate::error::{Error, Result};
use bytes::BufMut;

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` as a varint into `buf`.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes `encode_varint` produces for `value`.
pub fn encoded_len_varint(value: u64) -> usize {
    // 9/64 is a close enough approximation of 1/7 for every bit width
    ((((value | 1).leading_zeros() ^ 63) * 9 + 73) / 64) as usize
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Fails with
/// `MalformedVarint` when the 10th byte still has its continuation bit set
/// or the data ends before a terminating byte.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().enumerate() {
        result |= ((byte & 0x7F) as u64) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        if i == MAX_VARINT_LEN - 1 {
            return Err(Error::malformed_varint(0));
        }
    }

    Err(Error::malformed_varint(0))
}

/// ZigZag-map a signed 32-bit value (`sint32`).
pub fn encode_zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`encode_zigzag32`].
pub fn decode_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// ZigZag-map a signed 64-bit value (`sint64`).
pub fn encode_zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`encode_zigzag64`].
pub fn decode_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
