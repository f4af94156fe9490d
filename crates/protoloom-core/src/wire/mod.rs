//! Low-level protobuf wire format.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: START/END GROUP (deprecated; read but never written)
//! - 5: I32 (fixed32, sfixed32, float)

mod reader;
mod varint;
mod writer;

use crate::error::{Error, Result};

pub use reader::{WireReader, DEFAULT_BUFFER_SIZE, DEFAULT_RECURSION_LIMIT, DEFAULT_SIZE_LIMIT};
pub use varint::{
    decode_varint, decode_zigzag32, decode_zigzag64, encode_varint, encode_zigzag32,
    encode_zigzag64, encoded_len_varint, MAX_VARINT_LEN,
};
pub use writer::WireWriter;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::InvalidWireType { value, offset: 0 }),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: i32 = 536_870_911;

/// Field numbers reserved for the protobuf implementation itself
pub const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<i32> = 19_000..=19_999;

/// Reject field numbers that can never appear on the wire.
pub fn check_field_number(number: i32) -> Result<()> {
    if number < 1 || number > MAX_FIELD_NUMBER || RESERVED_FIELD_NUMBERS.contains(&number) {
        return Err(Error::invalid_field_number(number));
    }
    Ok(())
}

/// Pack a field number and wire type into a tag value.
pub fn make_tag(number: i32, wire_type: WireType) -> Result<u32> {
    check_field_number(number)?;
    Ok(((number as u32) << 3) | wire_type as u32)
}

/// Split a decoded tag value into field number and wire type.
pub fn split_tag(tag: u64) -> Result<(i32, WireType)> {
    if tag > u32::MAX as u64 {
        return Err(Error::invalid_field_number((tag >> 3) as i64));
    }
    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let number = (tag >> 3) as i32;
    check_field_number(number)?;
    Ok((number, wire_type))
}

/// Encoded length of the tag for `number` (any wire type).
pub fn tag_len(number: i32) -> usize {
    encoded_len_varint(((number as u32) << 3) as u64)
}
