//! Fields preserved verbatim because the schema did not recognize them.

use crate::error::{Error, Result};
use crate::wire::{check_field_number, encode_varint, tag_len, WireReader, WireType, WireWriter};
use bytes::{BufMut, Bytes};

/// One unrecognized field, kept exactly as received.
///
/// `data` is everything after the tag: the varint or fixed bytes, the
/// length prefix plus payload for `Len`, or the group body through its
/// end-group tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    number: i32,
    wire_type: WireType,
    data: Bytes,
}

impl UnknownField {
    /// Creates an unknown field from its raw encoding.
    ///
    /// `data` must frame exactly one value of `wire_type`: a `Len` payload
    /// carries its own length prefix and a group ends with its end-group tag.
    pub fn new(number: i32, wire_type: WireType, data: Bytes) -> Result<Self> {
        check_field_number(number)?;
        if wire_type == WireType::EndGroup {
            return Err(Error::InvalidWireType {
                value: WireType::EndGroup as u8,
                offset: 0,
            });
        }
        let mut reader = WireReader::from_slice(&data);
        reader.set_size_limit(u64::MAX);
        let framed = reader.read_raw_value(number, wire_type)?.len();
        if framed != data.len() {
            return Err(Error::TrailingBytes {
                number,
                extra: data.len() - framed,
            });
        }
        Ok(Self {
            number,
            wire_type,
            data,
        })
    }

    /// An unknown varint field, e.g. an undeclared closed-enum number
    pub(crate) fn varint(number: i32, value: u64) -> Self {
        let mut data = Vec::with_capacity(10);
        encode_varint(value, &mut data);
        Self {
            number,
            wire_type: WireType::Varint,
            data: data.into(),
        }
    }

    /// Trusted constructor for fields read off the wire
    pub(crate) fn from_wire(number: i32, wire_type: WireType, data: Bytes) -> Self {
        Self {
            number,
            wire_type,
            data,
        }
    }

    /// Field number
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Wire type of the original tag
    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// Raw bytes following the tag
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Encoded size including the tag
    pub fn encoded_len(&self) -> usize {
        tag_len(self.number) + self.data.len()
    }

    pub(crate) fn encode<B: BufMut>(&self, writer: &mut WireWriter<B>) -> Result<()> {
        writer.write_tag(self.number, self.wire_type)?;
        writer.write_raw(&self.data);
        Ok(())
    }
}

/// Unknown fields of one message, in the order they were read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    fields: Vec<UnknownField>,
}

impl UnknownFieldSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of preserved fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates in arrival order
    pub fn iter(&self) -> std::slice::Iter<'_, UnknownField> {
        self.fields.iter()
    }

    /// All occurrences of `number`
    pub fn get(&self, number: i32) -> impl Iterator<Item = &UnknownField> {
        self.fields.iter().filter(move |f| f.number == number)
    }

    /// Appends a field
    pub fn push(&mut self, field: UnknownField) {
        self.fields.push(field);
    }

    /// Appends every field of `other`
    pub fn extend_from(&mut self, other: &UnknownFieldSet) {
        self.fields.extend(other.fields.iter().cloned());
    }

    /// Removes all fields
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Encoded size of all fields
    pub fn encoded_len(&self) -> usize {
        self.fields.iter().map(UnknownField::encoded_len).sum()
    }

    pub(crate) fn encode<B: BufMut>(&self, writer: &mut WireWriter<B>) -> Result<()> {
        self.fields.iter().try_for_each(|field| field.encode(writer))
    }
}

impl<'a> IntoIterator for &'a UnknownFieldSet {
    type Item = &'a UnknownField;
    type IntoIter = std::slice::Iter<'a, UnknownField>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
